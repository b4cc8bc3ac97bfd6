use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::MissionConfig;
use crate::models::{
    DockStatus, Mission, MissionPhase, MissionPhaseChange, PhaseHint, PoseSample, TelemetrySample,
};

use super::stats::{record_battery, record_device_counters, CoverageTracker};

/// What a single telemetry sample did to the mission state.
#[derive(Debug, Default)]
pub struct MissionUpdate {
    pub changes: Vec<MissionPhaseChange>,
    /// Id of a mission created by this sample.
    pub started: Option<String>,
    /// Pose appended to the active mission by this sample.
    pub pose: Option<PoseSample>,
    /// Mission that reached `Completed` or `Error`; it is no longer owned by
    /// the machine.
    pub finished: Option<Mission>,
}

/// Derives mission lifecycle and statistics from the telemetry stream of one
/// device. Samples are taken in arrival order; their timestamps are only
/// recorded, never used for ordering.
pub struct MissionMachine {
    config: MissionConfig,
    active: Option<Mission>,
    idle_streak: u32,
    coverage: CoverageTracker,
}

impl MissionMachine {
    pub fn new(config: MissionConfig) -> Self {
        let coverage = CoverageTracker::new(config.cleaning_width, config.suspect_pose_policy);
        Self {
            config,
            active: None,
            idle_streak: 0,
            coverage,
        }
    }

    pub fn phase(&self) -> MissionPhase {
        self.active
            .as_ref()
            .map(|mission| mission.phase)
            .unwrap_or(MissionPhase::Idle)
    }

    pub fn active(&self) -> Option<&Mission> {
        self.active.as_ref()
    }

    pub fn observe(&mut self, sample: &TelemetrySample, now: Instant) -> MissionUpdate {
        let mut update = MissionUpdate::default();

        if self.active.is_none() {
            if sample.phase == PhaseHint::Run && sample.error_code.is_none() {
                self.begin(sample, now, &mut update);
                self.apply_sample(sample, now, &mut update);
            }
            return update;
        }

        let current = self.phase();

        if let Some(code) = sample.error_code {
            if matches!(
                current,
                MissionPhase::Running | MissionPhase::Paused | MissionPhase::Returning
            ) {
                // The faulting sample is not applied; statistics stay at the
                // last good sample.
                if let Some(mission) = self.active.as_mut() {
                    mission.freeze_clock();
                    mission.error_code = Some(code);
                }
                warn!("device reported error code {code} during {}", current.as_str());
                self.finish(MissionPhase::Error, sample.timestamp, now, &mut update);
                return update;
            }
        }

        if let Some(next) = next_phase(current, sample) {
            self.transition(next, sample.timestamp, now, &mut update);
        }

        // A robot that stops without pausing or docking reports idle from
        // any phase.
        if sample.phase == PhaseHint::Idle {
            self.idle_streak += 1;
        } else {
            self.idle_streak = 0;
        }

        self.apply_sample(sample, now, &mut update);

        if self.idle_streak >= self.config.idle_confirm_samples.max(1) {
            self.finish(MissionPhase::Completed, sample.timestamp, now, &mut update);
        }

        update
    }

    fn begin(&mut self, sample: &TelemetrySample, now: Instant, update: &mut MissionUpdate) {
        let id = Uuid::new_v4().to_string();
        info!("mission {id} started");

        self.coverage.reset();
        self.idle_streak = 0;
        self.active = Some(Mission::begin(id.clone(), sample.timestamp, now));

        update.changes.push(MissionPhaseChange {
            mission_id: id.clone(),
            from: MissionPhase::Idle,
            to: MissionPhase::Running,
            at: sample.timestamp,
        });
        update.started = Some(id);
    }

    fn transition(
        &mut self,
        next: MissionPhase,
        at: DateTime<Utc>,
        now: Instant,
        update: &mut MissionUpdate,
    ) {
        let Some(mission) = self.active.as_mut() else {
            return;
        };
        let from = mission.phase;
        if from == next {
            return;
        }

        if next.accrues_runtime() {
            mission.resume_clock(now);
        } else {
            mission.halt_clock(now);
        }
        mission.phase = next;

        debug!("mission {} {} -> {}", mission.id, from.as_str(), next.as_str());
        update.changes.push(MissionPhaseChange {
            mission_id: mission.id.clone(),
            from,
            to: next,
            at,
        });
    }

    fn apply_sample(&mut self, sample: &TelemetrySample, now: Instant, update: &mut MissionUpdate) {
        let Some(mission) = self.active.as_mut() else {
            return;
        };

        mission.sync_runtime(now);
        record_battery(mission, sample);
        record_device_counters(mission, sample);

        if !mission.phase.accepts_poses() {
            return;
        }
        let Some(raw) = sample.pose else {
            return;
        };

        let pose = PoseSample {
            x: raw.x,
            y: raw.y,
            heading_deg: raw.heading_deg,
            timestamp: sample.timestamp,
            quality: raw.quality,
        };
        if let Some(swept) = self.coverage.advance(&pose) {
            mission.area_estimate = Some(mission.area_estimate.unwrap_or(0.0) + swept);
        }
        mission.poses.push(pose);
        update.pose = Some(pose);
    }

    fn finish(
        &mut self,
        terminal: MissionPhase,
        at: DateTime<Utc>,
        now: Instant,
        update: &mut MissionUpdate,
    ) {
        self.transition(terminal, at, now, update);

        if let Some(mut mission) = self.active.take() {
            mission.halt_clock(now);
            mission.ended_at = Some(at);
            info!(
                "mission {} finished as {} after {}ms ({} poses)",
                mission.id,
                mission.phase.as_str(),
                mission.runtime_ms,
                mission.poses.len()
            );
            update.finished = Some(mission);
        }

        self.idle_streak = 0;
        self.coverage.reset();
    }
}

fn next_phase(current: MissionPhase, sample: &TelemetrySample) -> Option<MissionPhase> {
    use MissionPhase::*;

    match (current, sample.phase) {
        (Running, PhaseHint::Pause) => Some(Paused),
        (Paused, PhaseHint::Run) => Some(Running),
        (Running | Paused, PhaseHint::Returning) => Some(Returning),
        (Running | Paused | Returning, _) if sample.dock == DockStatus::Docked => Some(Docked),
        (Docked, PhaseHint::Run) => Some(Running),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuspectPosePolicy;
    use crate::models::{PayloadShape, RawPose, SampleQuality};
    use std::time::Duration;

    fn sample(phase: PhaseHint) -> TelemetrySample {
        let dock = match phase {
            PhaseHint::Docked | PhaseHint::Idle => DockStatus::Docked,
            PhaseHint::Unknown => DockStatus::Unknown,
            _ => DockStatus::Undocked,
        };
        TelemetrySample {
            battery_percent: Some(90),
            bin_full: false,
            bin_present: Some(true),
            dock,
            error_code: None,
            phase,
            pose: None,
            quality: SampleQuality::Valid,
            shape: PayloadShape::Shadow,
            mission_minutes: None,
            reported_area_sqft: None,
            timestamp: Utc::now(),
        }
    }

    fn with_pose(mut s: TelemetrySample, x: f64, y: f64) -> TelemetrySample {
        s.pose = Some(RawPose {
            x,
            y,
            heading_deg: 0.0,
            quality: SampleQuality::Valid,
        });
        s
    }

    fn machine() -> MissionMachine {
        MissionMachine::new(MissionConfig {
            idle_confirm_samples: 2,
            cleaning_width: 1.0,
            suspect_pose_policy: SuspectPosePolicy::Count,
        })
    }

    #[test]
    fn test_full_lifecycle() {
        let mut m = machine();
        let t0 = Instant::now();

        let update = m.observe(&sample(PhaseHint::Run), t0);
        assert!(update.started.is_some());
        assert_eq!(m.phase(), MissionPhase::Running);

        m.observe(&sample(PhaseHint::Pause), t0 + Duration::from_secs(10));
        assert_eq!(m.phase(), MissionPhase::Paused);

        m.observe(&sample(PhaseHint::Run), t0 + Duration::from_secs(30));
        assert_eq!(m.phase(), MissionPhase::Running);

        m.observe(&sample(PhaseHint::Returning), t0 + Duration::from_secs(40));
        assert_eq!(m.phase(), MissionPhase::Returning);

        m.observe(&sample(PhaseHint::Docked), t0 + Duration::from_secs(50));
        assert_eq!(m.phase(), MissionPhase::Docked);

        let first_idle = m.observe(&sample(PhaseHint::Idle), t0 + Duration::from_secs(60));
        assert!(first_idle.finished.is_none());

        let update = m.observe(&sample(PhaseHint::Idle), t0 + Duration::from_secs(70));
        let mission = update.finished.expect("mission should complete");
        assert_eq!(mission.phase, MissionPhase::Completed);
        assert!(mission.ended_at.is_some());
        // 10s running + 20s after resume until docking; paused and docked time excluded.
        assert_eq!(mission.runtime_ms, 30_000);
        assert_eq!(m.phase(), MissionPhase::Idle);
        assert!(m.active().is_none());
    }

    #[test]
    fn test_no_overlapping_running_missions() {
        let mut m = machine();
        let now = Instant::now();
        let mut starts = 0;
        let mut terminals = 0;

        let script = [
            PhaseHint::Run,
            PhaseHint::Run,
            PhaseHint::Pause,
            PhaseHint::Run,
            PhaseHint::Docked,
            PhaseHint::Run,
            PhaseHint::Returning,
            PhaseHint::Idle,
            PhaseHint::Idle,
            PhaseHint::Run,
            PhaseHint::Unknown,
        ];

        for hint in script {
            let update = m.observe(&sample(hint), now);
            for change in &update.changes {
                if change.from == MissionPhase::Idle && change.to == MissionPhase::Running {
                    assert_eq!(starts, terminals, "new mission started while one was active");
                    starts += 1;
                }
                if change.to.is_terminal() {
                    terminals += 1;
                }
            }
        }

        assert_eq!(starts, 2);
        assert_eq!(terminals, 1);
        assert_eq!(m.phase(), MissionPhase::Running);
    }

    #[test]
    fn test_error_freezes_statistics() {
        let mut m = machine();
        let t0 = Instant::now();

        let mut first = with_pose(sample(PhaseHint::Run), 0.0, 0.0);
        first.battery_percent = Some(80);
        m.observe(&first, t0);

        let mut second = with_pose(sample(PhaseHint::Run), 10.0, 0.0);
        second.battery_percent = Some(70);
        m.observe(&second, t0 + Duration::from_secs(5));

        let mut faulted = with_pose(sample(PhaseHint::Stuck), 500.0, 500.0);
        faulted.error_code = Some(2);
        faulted.battery_percent = Some(10);
        let update = m.observe(&faulted, t0 + Duration::from_secs(60));

        let mission = update.finished.expect("error ends the mission");
        assert_eq!(mission.phase, MissionPhase::Error);
        assert_eq!(mission.error_code, Some(2));
        assert_eq!(mission.poses.len(), 2);
        assert_eq!(mission.battery_min, Some(70));
        assert_eq!(mission.area_estimate, Some(10.0));
        assert_eq!(mission.runtime_ms, 5_000);
        assert_eq!(update.changes.last().unwrap().to, MissionPhase::Error);

        // Later samples carrying the same fault never start or touch a mission.
        let mut after = with_pose(sample(PhaseHint::Run), 1.0, 1.0);
        after.error_code = Some(2);
        let update = m.observe(&after, t0 + Duration::from_secs(61));
        assert!(update.started.is_none());
        assert!(update.changes.is_empty());
        assert_eq!(m.phase(), MissionPhase::Idle);
    }

    #[test]
    fn test_poses_only_recorded_while_running_or_paused() {
        let mut m = machine();
        let now = Instant::now();

        m.observe(&with_pose(sample(PhaseHint::Idle), 1.0, 1.0), now);
        assert!(m.active().is_none());

        let update = m.observe(&with_pose(sample(PhaseHint::Run), 0.0, 0.0), now);
        assert!(update.pose.is_some());

        let update = m.observe(&with_pose(sample(PhaseHint::Pause), 1.0, 0.0), now);
        assert!(update.pose.is_some());

        let update = m.observe(&with_pose(sample(PhaseHint::Returning), 2.0, 0.0), now);
        assert!(update.pose.is_none());
        assert_eq!(m.active().unwrap().poses.len(), 2);
    }

    #[test]
    fn test_area_stays_null_without_pose() {
        let mut m = machine();
        let now = Instant::now();
        m.observe(&sample(PhaseHint::Run), now);
        m.observe(&sample(PhaseHint::Run), now);
        assert_eq!(m.active().unwrap().area_estimate, None);
    }

    #[test]
    fn test_battery_range_tracked() {
        let mut m = machine();
        let now = Instant::now();
        for pct in [90, 60, 75] {
            let mut s = sample(PhaseHint::Run);
            s.battery_percent = Some(pct);
            m.observe(&s, now);
        }
        let mission = m.active().unwrap();
        assert_eq!(mission.battery_min, Some(60));
        assert_eq!(mission.battery_max, Some(90));
    }

    #[test]
    fn test_cancelled_mission_completes_from_pause() {
        let mut m = machine();
        let now = Instant::now();
        m.observe(&sample(PhaseHint::Run), now);
        m.observe(&sample(PhaseHint::Pause), now);

        let mut cancelled = sample(PhaseHint::Idle);
        cancelled.dock = DockStatus::Unknown;
        assert!(m.observe(&cancelled, now).finished.is_none());
        let finished = m.observe(&cancelled, now).finished.unwrap();
        assert_eq!(finished.phase, MissionPhase::Completed);
    }

    #[test]
    fn test_stop_while_running_completes_after_idle_streak() {
        let mut m = machine();
        let t0 = Instant::now();
        let first = m.observe(&sample(PhaseHint::Run), t0).started.unwrap();
        m.observe(&sample(PhaseHint::Run), t0 + Duration::from_secs(5));

        let mut stopped = sample(PhaseHint::Idle);
        stopped.dock = DockStatus::Undocked;
        let update = m.observe(&stopped, t0 + Duration::from_secs(6));
        assert!(update.finished.is_none());
        assert_eq!(m.phase(), MissionPhase::Running);

        let update = m.observe(&stopped, t0 + Duration::from_secs(7));
        let mission = update.finished.expect("idle streak ends a running mission");
        assert_eq!(mission.id, first);
        assert_eq!(mission.phase, MissionPhase::Completed);
        assert_eq!(m.phase(), MissionPhase::Idle);

        for _ in 0..10 {
            assert!(m.observe(&stopped, t0 + Duration::from_secs(8)).changes.is_empty());
        }
        let next = m.observe(&sample(PhaseHint::Run), t0 + Duration::from_secs(9));
        let second = next.started.expect("next run starts a new mission");
        assert_ne!(second, first);
        assert_eq!(next.changes[0].from, MissionPhase::Idle);
    }

    #[test]
    fn test_mid_mission_recharge_resumes_same_mission() {
        let mut m = machine();
        let now = Instant::now();
        let started = m.observe(&sample(PhaseHint::Run), now).started.unwrap();
        m.observe(&sample(PhaseHint::Returning), now);
        m.observe(&sample(PhaseHint::Docked), now);
        let update = m.observe(&sample(PhaseHint::Run), now);
        assert!(update.started.is_none());
        assert_eq!(m.active().unwrap().id, started);
        assert_eq!(m.phase(), MissionPhase::Running);
    }
}
