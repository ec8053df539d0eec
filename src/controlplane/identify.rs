//! Device Identification
//!
//! Blinks the identification light of a device for a requested number of
//! seconds, reporting progress once per second.

use crate::domain::ports::{DeviceLightKind, OrchestratorClient};
use crate::error::{Error, Result};
use crate::tasks::{ProgressSink, TaskMetadata};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Task name used for device identification
pub const IDENTIFY_TASK: &str = "orchestrator/identify_device";

/// Interval between progress reports
pub const TICK: Duration = Duration::from_secs(1);

/// Request to identify a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifyDevice {
    /// Host the device is attached to
    pub hostname: String,
    /// Device identifier, e.g. `ABC1234DEF567-1R1234_ABC8DE0Q`
    pub device: String,
    /// Seconds the light should stay on; numbers or numeric strings
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: f64,
}

impl IdentifyDevice {
    /// Metadata identifying the task
    pub fn task_metadata(&self) -> TaskMetadata {
        [
            ("hostname".to_string(), self.hostname.clone()),
            ("device".to_string(), self.device.clone()),
        ]
        .into_iter()
        .collect()
    }

    /// Number of one-second ticks (duration truncated to whole seconds)
    pub fn ticks(&self) -> u64 {
        if self.duration > 0.0 {
            self.duration.trunc() as u64
        } else {
            0
        }
    }
}

/// Percentage reported at tick `i`, rounded half to even
pub fn tick_percentage(i: u64, duration: f64) -> u8 {
    let percentage = (i as f64 / duration * 100.0).round_ties_even();
    percentage.clamp(0.0, 100.0) as u8
}

/// Switch the identification light on, tick for the requested duration,
/// then switch it off and report 100%.
///
/// On cancellation the loop stops early and the light is still switched off;
/// the operation then fails with `TaskCancelled`.
pub async fn identify_device(
    orchestrator: &dyn OrchestratorClient,
    progress: &dyn ProgressSink,
    request: &IdentifyDevice,
    cancel: &CancellationToken,
) -> Result<()> {
    let IdentifyDevice {
        hostname, device, ..
    } = request;

    info!(
        "Identifying device {} on {} for {}s",
        device, hostname, request.duration
    );
    orchestrator
        .blink_device_light(hostname, device, DeviceLightKind::Ident, true)
        .await?;

    let mut cancelled = false;
    for i in 0..request.ticks() {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let percent = tick_percentage(i, request.duration);
        debug!("Identify {}:{} at {}%", hostname, device, percent);
        progress.set_progress(percent);

        tokio::select! {
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            _ = tokio::time::sleep(TICK) => {}
        }
    }

    orchestrator
        .blink_device_light(hostname, device, DeviceLightKind::Ident, false)
        .await?;

    if cancelled {
        warn!("Identification of {} on {} cancelled", device, hostname);
        return Err(Error::TaskCancelled {
            name: IDENTIFY_TASK.to_string(),
        });
    }

    progress.set_progress(100);
    Ok(())
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    let value = match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n,
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid duration: {:?}", s)))?,
    };

    if !value.is_finite() {
        return Err(serde::de::Error::custom("duration must be finite"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::{InMemoryOrchestrator, LightCall};
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct Recorder {
        updates: Mutex<Vec<u8>>,
    }

    impl ProgressSink for Recorder {
        fn set_progress(&self, percent: u8) {
            self.updates.lock().push(percent);
        }
    }

    fn request(duration: f64) -> IdentifyDevice {
        IdentifyDevice {
            hostname: "node1".into(),
            device: "vdc".into(),
            duration,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_second_identify() {
        let orch = InMemoryOrchestrator::new();
        let progress = Recorder::default();
        let start = Instant::now();

        identify_device(&orch, &progress, &request(3.0), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*progress.updates.lock(), vec![0, 33, 67, 100]);
        assert_eq!(start.elapsed().as_secs(), 3);
        assert_eq!(
            orch.light_calls(),
            vec![
                LightCall::new("node1", "vdc", DeviceLightKind::Ident, true),
                LightCall::new("node1", "vdc", DeviceLightKind::Ident, false),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_duration_is_truncated() {
        let orch = InMemoryOrchestrator::new();
        let progress = Recorder::default();
        let start = Instant::now();

        identify_device(&orch, &progress, &request(2.5), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*progress.updates.lock(), vec![0, 40, 100]);
        assert_eq!(start.elapsed().as_secs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_still_switches_light_off() {
        let orch = InMemoryOrchestrator::new();
        let progress = Recorder::default();

        identify_device(&orch, &progress, &request(0.0), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*progress.updates.lock(), vec![100]);
        assert_eq!(orch.light_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_loop_switches_light_off() {
        let orch = InMemoryOrchestrator::new();
        let progress = Recorder::default();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            canceller.cancel();
        });

        let err = identify_device(&orch, &progress, &request(10.0), &cancel)
            .await
            .unwrap_err();

        assert_matches!(err, Error::TaskCancelled { .. });
        assert_eq!(*progress.updates.lock(), vec![0, 10]);
        let calls = orch.light_calls();
        assert_eq!(calls.len(), 2);
        assert!(!calls[1].on);
    }

    #[tokio::test(start_paused = true)]
    async fn test_light_failure_aborts_before_ticking() {
        let orch = InMemoryOrchestrator::new();
        orch.fail_lights(true);
        let progress = Recorder::default();

        let err = identify_device(&orch, &progress, &request(3.0), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_matches!(err, Error::OrchestratorRemote { .. });
        assert!(progress.updates.lock().is_empty());
    }

    #[test]
    fn test_tick_percentage_rounds_half_to_even() {
        assert_eq!(tick_percentage(0, 3.0), 0);
        assert_eq!(tick_percentage(1, 3.0), 33);
        assert_eq!(tick_percentage(2, 3.0), 67);
        assert_eq!(tick_percentage(1, 8.0), 12);
        assert_eq!(tick_percentage(3, 8.0), 38);
    }

    #[test]
    fn test_duration_accepts_numbers_and_strings() {
        let req: IdentifyDevice = serde_json::from_str(
            r#"{"hostname": "node1", "device": "vdc", "duration": "15"}"#,
        )
        .unwrap();
        assert_eq!(req.ticks(), 15);

        let req: IdentifyDevice =
            serde_json::from_str(r#"{"hostname": "h", "device": "d", "duration": 4.9}"#).unwrap();
        assert_eq!(req.ticks(), 4);

        let req: IdentifyDevice =
            serde_json::from_str(r#"{"hostname": "h", "device": "d", "duration": -2}"#).unwrap();
        assert_eq!(req.ticks(), 0);

        assert!(serde_json::from_str::<IdentifyDevice>(
            r#"{"hostname": "h", "device": "d", "duration": "soon"}"#
        )
        .is_err());
    }

    #[test]
    fn test_task_metadata() {
        let metadata = request(3.0).task_metadata();
        assert_eq!(metadata["hostname"], "node1");
        assert_eq!(metadata["device"], "vdc");
    }
}
