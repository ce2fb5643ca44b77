use crate::model::{Mode, SysConfig, TelemetrySample};
use rand::Rng;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time;

pub struct ModeRunner {
    telemetry_tx: broadcast::Sender<TelemetrySample>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ModeRunner {
    pub fn new(telemetry_tx: broadcast::Sender<TelemetrySample>) -> Self {
        Self {
            telemetry_tx,
            task: Mutex::new(None),
        }
    }

    pub async fn start(&self, sys: &SysConfig) {
        let mut guard = self.task.lock().await;
        if let Some(previous) = guard.take() {
            previous.abort();
        }
        *guard = match &sys.mode {
            Mode::Simulator => {
                let period = cycle_period(sys.cycle_time);
                tracing::info!("Starting simulator, one sample every {period:?}");
                Some(tokio::spawn(simulate(self.telemetry_tx.clone(), period)))
            }
            Mode::Unknown(raw) => {
                tracing::warn!("Not starting anything for unknown mode '{raw}'");
                None
            }
            other => {
                tracing::info!("No acquisition backend for {other} mode on this host");
                None
            }
        };
    }

    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
    }
}

fn cycle_period(cycle_time: i64) -> Duration {
    Duration::from_secs(u64::try_from(cycle_time).unwrap_or(1).max(1))
}

pub fn random_sample(rng: &mut impl Rng) -> TelemetrySample {
    let grid = rng.gen_range(0..=100);
    let pv = rng.gen_range(0..=100);
    TelemetrySample {
        load: grid + pv,
        pv,
        grid,
        status: "NA".to_string(),
    }
}

async fn simulate(tx: broadcast::Sender<TelemetrySample>, period: Duration) {
    let mut interval = time::interval(period);
    loop {
        interval.tick().await;
        let sample = random_sample(&mut rand::thread_rng());
        // No subscribers is fine; the next sample replaces this one anyway.
        let _ = tx.send(sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_load_is_grid_plus_pv() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let sample = random_sample(&mut rng);
            assert!((0..=100).contains(&sample.grid));
            assert!((0..=100).contains(&sample.pv));
            assert_eq!(sample.load, sample.grid + sample.pv);
        }
    }

    #[test]
    fn cycle_period_has_floor() {
        assert_eq!(cycle_period(0), Duration::from_secs(1));
        assert_eq!(cycle_period(-4), Duration::from_secs(1));
        assert_eq!(cycle_period(5), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn simulator_mode_publishes_samples() {
        let (tx, mut rx) = broadcast::channel(4);
        let runner = ModeRunner::new(tx);
        runner.start(&SysConfig::default()).await;
        let sample = time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sample.status, "NA");
        runner.stop().await;
    }

    #[tokio::test]
    async fn hardware_modes_start_no_task() {
        let (tx, _rx) = broadcast::channel(4);
        let runner = ModeRunner::new(tx);
        let sys = SysConfig {
            mode: Mode::Standalone,
            ..SysConfig::default()
        };
        runner.start(&sys).await;
        assert!(runner.task.lock().await.is_none());
    }
}
