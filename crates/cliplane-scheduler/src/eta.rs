//! ETA estimation.
//!
//! Pure functions over a snapshot of active jobs. The estimator never
//! mutates anything; persisting a refreshed value is the caller's job.
//! Estimates are advisory, so snapshot staleness is tolerated.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use cliplane_models::{Job, Lane, PlanCatalog};

use crate::config::SchedulerConfig;

/// Queue ordering rule: `a` is served before `b` iff `a` is in a
/// higher-priority lane, or in the same lane and was created earlier.
/// Lower lane always wins regardless of arrival time; within a lane the
/// queue is strict FIFO.
pub fn is_ahead_of(a: &Job, b: &Job) -> bool {
    a.lane < b.lane || (a.lane == b.lane && a.created_at < b.created_at)
}

fn target_multiplier(job: &Job, plans: &PlanCatalog) -> f64 {
    plans
        .get(job.plan_id)
        .map(|p| p.target_multiplier)
        .unwrap_or(1.0)
}

/// Expected processing minutes for the job itself.
pub fn expected_minutes(job: &Job, plans: &PlanCatalog) -> f64 {
    f64::from(job.input_minutes) * target_multiplier(job, plans)
}

/// Weighted input-minutes of every snapshot job served before `job`.
pub fn queue_minutes_ahead(job: &Job, snapshot: &[Job], plans: &PlanCatalog) -> f64 {
    snapshot
        .iter()
        .filter(|other| other.id != job.id && is_ahead_of(other, job))
        .map(|other| f64::from(other.input_minutes) * target_multiplier(other, plans))
        .sum()
}

/// Estimated seconds until the job reaches a terminal state.
///
/// `round(queue_ahead / throughput + expected_minutes) × 60`.
pub fn compute_eta_seconds(
    job: &Job,
    snapshot: &[Job],
    plans: &PlanCatalog,
    throughput: f64,
) -> i64 {
    let effective = if throughput > 0.0 { throughput } else { 1.0 };
    let queue_ahead = queue_minutes_ahead(job, snapshot, plans);
    let eta_minutes = queue_ahead / effective + expected_minutes(job, plans);
    (eta_minutes.round() as i64) * 60
}

/// Per-lane slice of the aggregate queue view.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct LaneStatus {
    /// Active jobs in the lane
    pub count: u32,
    /// Average of the stored ETAs across those jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_eta_seconds: Option<i64>,
}

/// Read-only projection of the queue, grouped by lane.
///
/// All three lanes are always present, zeroed when idle.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueueStatus {
    pub lanes: BTreeMap<Lane, LaneStatus>,
    /// Configured per-lane throughput constants
    pub throughput: BTreeMap<Lane, f64>,
}

/// Group a snapshot of active jobs by lane.
pub fn queue_status(snapshot: &[Job], config: &SchedulerConfig) -> QueueStatus {
    let mut lanes: BTreeMap<Lane, LaneStatus> = Lane::ALL
        .iter()
        .map(|lane| (*lane, LaneStatus::default()))
        .collect();

    let mut eta_sums: BTreeMap<Lane, (i64, i64)> = BTreeMap::new();
    for job in snapshot {
        let status = lanes.entry(job.lane).or_default();
        status.count += 1;
        if let Some(eta) = job.eta_seconds {
            let (sum, n) = eta_sums.entry(job.lane).or_insert((0, 0));
            *sum += eta;
            *n += 1;
        }
    }
    for (lane, (sum, n)) in eta_sums {
        if let Some(status) = lanes.get_mut(&lane) {
            status.avg_eta_seconds = Some(sum / n);
        }
    }

    let throughput = Lane::ALL
        .iter()
        .map(|lane| (*lane, config.throughput_for(*lane)))
        .collect();

    QueueStatus { lanes, throughput }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use cliplane_models::{OrgId, Plan, PlanId};

    fn job_on(plan_id: PlanId, input_minutes: u32) -> Job {
        Job::queued(
            OrgId::from_string("org-1"),
            "https://example.com/v.mp4",
            input_minutes,
            &Plan::for_id(plan_id),
            None,
        )
    }

    #[test]
    fn lower_lane_is_ahead_regardless_of_arrival() {
        let mut express = job_on(PlanId::Express, 10);
        let standard = job_on(PlanId::Standard, 10);
        // The express job arrived later but still goes first.
        express.created_at = standard.created_at + Duration::seconds(30);
        assert!(is_ahead_of(&express, &standard));
        assert!(!is_ahead_of(&standard, &express));
    }

    #[test]
    fn same_lane_is_fifo_by_creation_time() {
        let first = job_on(PlanId::Standard, 10);
        let mut second = job_on(PlanId::Standard, 10);
        second.created_at = first.created_at + Duration::seconds(1);
        assert!(is_ahead_of(&first, &second));
        assert!(!is_ahead_of(&second, &first));
    }

    #[test]
    fn empty_queue_eta_is_expected_minutes_only() {
        let plans = PlanCatalog::builtin();
        let job = job_on(PlanId::Express, 10);
        // 10 min x 0.80 = 8 min, no queue-ahead term.
        let eta = compute_eta_seconds(&job, &[], &plans, 1.6);
        assert_eq!(eta, 480);
    }

    #[test]
    fn lane_zero_work_counts_against_later_lane_one_arrival() {
        let plans = PlanCatalog::builtin();
        let express = job_on(PlanId::Express, 10);
        let mut priority = job_on(PlanId::Priority, 20);
        priority.created_at = express.created_at + Duration::seconds(5);

        let snapshot = vec![express.clone(), priority.clone()];
        let ahead = queue_minutes_ahead(&priority, &snapshot, &plans);
        // 10 x 0.80 = 8 minutes of express work precede it.
        assert!((ahead - 8.0).abs() < f64::EPSILON);

        // 8 / 1.2 + 20 x 1.20 = 6.67 + 24 -> round(30.67) = 31 min.
        let eta = compute_eta_seconds(&priority, &snapshot, &plans, 1.2);
        assert_eq!(eta, 31 * 60);
    }

    #[test]
    fn eta_is_monotonic_in_queue_ahead() {
        let plans = PlanCatalog::builtin();
        let target = job_on(PlanId::Standard, 30);

        let mut snapshot = Vec::new();
        let mut last_eta = compute_eta_seconds(&target, &snapshot, &plans, 1.0);
        for _ in 0..5 {
            let mut ahead = job_on(PlanId::Standard, 15);
            ahead.created_at = target.created_at - Duration::seconds(60);
            snapshot.push(ahead);
            let eta = compute_eta_seconds(&target, &snapshot, &plans, 1.0);
            assert!(eta >= last_eta, "eta must not shrink as the queue grows");
            last_eta = eta;
        }
    }

    #[test]
    fn snapshot_never_counts_the_job_itself() {
        let plans = PlanCatalog::builtin();
        let job = job_on(PlanId::Express, 10);
        let snapshot = vec![job.clone()];
        assert_eq!(queue_minutes_ahead(&job, &snapshot, &plans), 0.0);
    }

    #[test]
    fn queue_status_reports_all_lanes() {
        let config = SchedulerConfig::default();
        let mut a = job_on(PlanId::Express, 10);
        a.eta_seconds = Some(480);
        let mut b = job_on(PlanId::Express, 20);
        b.eta_seconds = Some(960);
        let c = job_on(PlanId::Standard, 30); // no stored ETA yet

        let status = queue_status(&[a, b, c], &config);
        assert_eq!(status.lanes[&Lane::P0].count, 2);
        assert_eq!(status.lanes[&Lane::P0].avg_eta_seconds, Some(720));
        assert_eq!(status.lanes[&Lane::P1].count, 0);
        assert_eq!(status.lanes[&Lane::P1].avg_eta_seconds, None);
        assert_eq!(status.lanes[&Lane::P2].count, 1);
        assert_eq!(status.lanes[&Lane::P2].avg_eta_seconds, None);
        assert!((status.throughput[&Lane::P0] - 1.6).abs() < f64::EPSILON);
    }
}
