use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream;
use guru_core::ai::{ProviderStream, ERROR_NOTICE};
use guru_core::history::STORAGE_KEY;
use guru_core::{
    ChatProvider, ConversationHistory, Error, FileHistoryStore, HistoryStore, Mode,
    ProviderBackend, Role, SendState, SessionController, Turn,
};
use tempfile::TempDir;

/// Streams a fixed reply, or fails after a prefix when `fail_after` is set
struct CannedProvider {
    fragments: Vec<&'static str>,
    fail_after: Option<usize>,
}

#[async_trait]
impl ChatProvider for CannedProvider {
    async fn generate(&self, _system: &str, _turns: &[Turn]) -> guru_core::Result<String> {
        Ok(self.fragments.concat())
    }

    async fn generate_stream(
        &self,
        _system: &str,
        _turns: &[Turn],
    ) -> guru_core::Result<ProviderStream> {
        let mut items: Vec<guru_core::Result<String>> =
            self.fragments.iter().map(|f| Ok(f.to_string())).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(Error::Api {
                status: 429,
                body: "quota".to_string(),
            }));
        }
        Ok(Box::pin(stream::iter(items)))
    }

    fn name(&self) -> &'static str {
        "Canned"
    }

    fn model(&self) -> &str {
        "canned"
    }
}

fn backend(fragments: Vec<&'static str>, fail_after: Option<usize>) -> Arc<ProviderBackend> {
    Arc::new(ProviderBackend::new(Arc::new(CannedProvider {
        fragments,
        fail_after,
    })))
}

fn history_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join(format!("{}.json", STORAGE_KEY))
}

#[tokio::test]
async fn test_history_survives_restart() {
    let dir = TempDir::new().unwrap();

    let mut ctl = SessionController::new(
        FileHistoryStore::new(history_path(&dir)),
        backend(vec!["Na", "mas", "te"], None),
    );
    ctl.enter(Mode::Teacher);
    assert!(ctl.submit("Hello").await);
    let saved = ctl.history().clone();

    let reloaded = SessionController::new(
        FileHistoryStore::new(history_path(&dir)),
        backend(vec![], None),
    );
    assert_eq!(reloaded.history(), &saved);
    assert_eq!(reloaded.messages(Mode::Teacher)[1].content, "Namaste");
    assert!(reloaded.messages(Mode::Astrologer).is_empty());
}

#[tokio::test]
async fn test_modes_stay_independent() {
    let dir = TempDir::new().unwrap();
    let mut ctl = SessionController::new(
        FileHistoryStore::new(history_path(&dir)),
        backend(vec!["Subh ", "ho"], None),
    );

    ctl.enter(Mode::Astrologer);
    ctl.submit("Aaj ka din?").await;
    let astrologer = ctl.messages(Mode::Astrologer).to_vec();

    ctl.leave();
    ctl.enter(Mode::Teacher);
    ctl.submit("Newton's law?").await;
    assert!(ctl.clear(&|_: &str| true));

    assert!(ctl.messages(Mode::Teacher).is_empty());
    assert_eq!(ctl.messages(Mode::Astrologer), astrologer.as_slice());
}

#[tokio::test]
async fn test_provider_failure_leaves_notice_not_empty_placeholder() {
    let dir = TempDir::new().unwrap();
    let mut ctl = SessionController::new(
        FileHistoryStore::new(history_path(&dir)),
        backend(vec!["Beta", " suno"], Some(1)),
    );
    ctl.enter(Mode::Astrologer);
    assert!(ctl.submit("Mera bhavishya?").await);

    let reply = &ctl.messages(Mode::Astrologer)[1];
    assert_eq!(reply.role, Role::Model);
    assert_eq!(reply.content, format!("Beta{}", ERROR_NOTICE));
    assert_eq!(ctl.state(Mode::Astrologer), SendState::Idle);

    // the next turn is accepted again
    assert!(ctl.submit("Phir se?").await);
    assert_eq!(ctl.messages(Mode::Astrologer).len(), 4);
}

#[tokio::test]
async fn test_stream_driven_step_by_step() {
    use futures_util::StreamExt;

    let dir = TempDir::new().unwrap();
    let mut ctl = SessionController::new(
        FileHistoryStore::new(history_path(&dir)),
        backend(vec!["Na", "mas", "te"], None),
    );
    ctl.enter(Mode::Teacher);

    let submission = ctl.begin_submit("Greet me").unwrap();
    assert_eq!(ctl.messages(Mode::Teacher)[0].content, "Greet me");
    assert!(ctl.messages(Mode::Teacher)[1].is_pending());

    let mut fragments = submission.fragments();
    let mut expected = String::new();
    while let Some(fragment) = fragments.next().await {
        expected.push_str(&fragment);
        ctl.apply_fragment(submission.mode, &submission.reply_id, &fragment);

        // each published snapshot is on disk too
        let on_disk = FileHistoryStore::new(history_path(&dir)).load();
        assert_eq!(on_disk.sequence(Mode::Teacher)[1].content, expected);
    }
    ctl.complete(submission.mode);

    assert_eq!(expected, "Namaste");
}

#[test]
fn test_corrupt_history_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    std::fs::write(history_path(&dir), "{\"teacher\": [{\"id\": 5").unwrap();

    let ctl = SessionController::new(
        FileHistoryStore::new(history_path(&dir)),
        backend(vec![], None),
    );
    assert_eq!(ctl.history(), &ConversationHistory::default());
}
