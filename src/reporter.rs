//! Progress Reporter: one thread per Running job, fixed 4-second
//! tick, pure render over a `DashboardSnapshot`, edits a single message
//! (never appends). Exits as soon as the job leaves Running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::config::REPORTER_TICK;
use crate::dashboard::DashboardSnapshot;
use crate::notifier::{MessageHandle, Notifier};

/// Spawns the reporter thread for one Running job. Returns a stop flag the
/// caller flips when the job leaves Running; the thread joins itself via
/// the returned `JoinHandle`.
pub fn spawn(
    notifier: Arc<dyn Notifier>,
    dashboard: Arc<DashboardSnapshot>,
    handle: MessageHandle,
    display_name: String,
) -> (Arc<AtomicBool>, thread::JoinHandle<()>) {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_thread = stop.clone();

    let join = thread::Builder::new()
    .name("progress-reporter".to_string())
    .spawn(move || {
            const POLL: std::time::Duration = std::time::Duration::from_millis(50);
            while !stop_for_thread.load(Ordering::SeqCst) {
                let rendered = dashboard.render(&display_name);
                let _ = notifier.edit(&handle, &rendered);

                let mut waited = std::time::Duration::ZERO;
                while waited < REPORTER_TICK && !stop_for_thread.load(Ordering::SeqCst) {
                    thread::sleep(POLL);
                    waited += POLL;
                }
            }
        })
    .expect("failed to spawn progress reporter thread");

    (stop, join)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::dashboard::{DownloadProgress, Phase};
    use crate::ids::UserId;

    struct RecordingNotifier {
        edits: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, _user: UserId, _text: &str) -> anyhow::Result<MessageHandle> {
            Ok(MessageHandle("unused".into()))
        }
        fn edit(&self, _handle: &MessageHandle, text: &str) -> anyhow::Result<()> {
            self.edits.lock().unwrap().push(text.to_string());
            Ok(())
        }
        fn delete(&self, _handle: &MessageHandle) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reporter_stops_promptly_once_the_stop_flag_is_set() {
        let notifier = Arc::new(RecordingNotifier { edits: Mutex::new(Vec::new()) });
        let dashboard = Arc::new(DashboardSnapshot::new());
        dashboard.set_phase(Phase::Download);
        dashboard.update_download(DownloadProgress {
                percent: Some(10.0),
                ..Default::default()
            });

        let (stop, join) = spawn(
            notifier.clone(),
            dashboard,
            MessageHandle("m1".into()),
            "video.mkv".into(),
        );
        stop.store(true, Ordering::SeqCst);
        join.join().unwrap();
    }
}
