//! Production gateways: notifications go to the log, statistics go to the
//! metrics facade.

use dojo_scheduler_core::cohort::{Cohort, SessionType};
use dojo_scheduler_core::gateway::{
    GatewayFuture, NotificationGateway, NotificationKind, StatisticKind, StatisticsRecorder,
};
use dojo_scheduler_core::slot::Slot;
use metrics::counter;

/// Notification gateway that writes each notification as a structured log
/// line.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingNotifier;

impl NotificationGateway for LoggingNotifier {
    fn notify<'a>(
        &'a self,
        kind: NotificationKind,
        target_user: &'a str,
        slot: &'a Slot,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            tracing::info!(
                kind = kind.as_str(),
                target_user,
                slot_id = %slot.id,
                start_time = %slot.start_time,
                "Notification sent"
            );
            Ok(())
        })
    }
}

/// Statistics recorder backed by the `scheduler_statistics_total` counter.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsStatisticsRecorder;

impl MetricsStatisticsRecorder {
    /// Metric incremented once per recorded statistic.
    pub const METRIC: &'static str = "scheduler_statistics_total";
}

impl StatisticsRecorder for MetricsStatisticsRecorder {
    fn record<'a>(
        &'a self,
        kind: StatisticKind,
        cohort: &'a Cohort,
        slot_type: Option<SessionType>,
    ) -> GatewayFuture<'a, ()> {
        let slot_type = slot_type.map_or("none", |t| t.as_str());
        counter!(
            Self::METRIC,
            "kind" => kind.as_str(),
            "cohort" => cohort.as_str().to_string(),
            "slot_type" => slot_type
        )
        .increment(1);
        Box::pin(async { Ok(()) })
    }
}
