//! Host collaborator traits. The interpreter consumes a file-system
//! enumerator and mtime probe, a chat/print sink, and optionally an external
//! script executor for `#call`; none of these are implemented by this crate,
//! only called. Test doubles (`InMemory*`) live alongside for unit and
//! integration tests, mirroring the host crate's own in-memory filesystem
//! pairing for its own tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Three-way result of probing a file's on-disk state against a cached mtime,
/// mirroring `FileTest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileProbeResult {
    /// Unchanged since the cached mtime.
    Ok,
    /// The file no longer exists.
    Missing,
    /// The mtime advanced; reparse on next lookup.
    Reload,
}

/// A file system enumerator and mtime probe. Implemented by the host;
/// consumed by [`crate::cache::ParseCache`].
#[async_trait]
pub trait FileProbe: Send + Sync {
    /// Reads the full text contents of `path`.
    async fn read_to_string(&self, path: &str) -> anyhow::Result<String>;

    /// Lists every `*.cheat` file under `search_path` (non-recursive).
    async fn list_cheat_files(&self, search_path: &str) -> anyhow::Result<Vec<String>>;

    /// The current modification time of `path`, as an opaque monotonically
    /// comparable token (e.g. seconds since epoch). Returns `None` if the
    /// path does not exist.
    async fn mtime(&self, path: &str) -> anyhow::Result<Option<i64>>;

    /// Probes `path` against `known_mtime`.
    async fn probe(&self, path: &str, known_mtime: i64) -> anyhow::Result<FileProbeResult> {
        match self.mtime(path).await? {
            None => Ok(FileProbeResult::Missing),
            Some(m) if m > known_mtime => Ok(FileProbeResult::Reload),
            Some(_) => Ok(FileProbeResult::Ok),
        }
    }

    async fn write_to_string(&self, path: &str, contents: &str) -> anyhow::Result<()>;
}

/// The sink a plain chat line (or dispatcher-forwarded text) is sent to.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send_msg(&self, text: &str);
    async fn print_msg(&self, rich_text: &str);
}

/// The body shape handed to an external `#call` executor: a header line
/// describing the argument vector, plus the captured and substituted body of
/// the `#call … #end` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEnvelope {
    /// `[arg1,arg2,...]`, blank slots rendered as the literal `null`.
    pub header: String,
    /// The substituted interior lines of the `#call` block, one per element.
    pub body: Vec<String>,
}

/// An external script executor for `#call` bodies (script-named dispatch),
/// e.g. a bridge to an embedded scripting runtime.
#[async_trait]
pub trait ExternalScriptExecutor: Send + Sync {
    async fn call(&self, target: &str, envelope: CallEnvelope) -> anyhow::Result<()>;
}

/// A host-supplied optional per-call prologue for `#call`.
pub trait HeaderProvider: Send + Sync {
    fn get_external_script_header(&self, _target: &str) -> Option<String> {
        None
    }
}

/// File-picker collaborator backing `$browse[...]`. Desktop-only in the
/// original (Windows-gated); the default implementation always returns `None`
/// ("no selection"), matching the non-Windows fallthrough.
#[async_trait]
pub trait FilePicker: Send + Sync {
    async fn browse_files(&self, _options: &[String]) -> Option<String> {
        None
    }
}

/// An in-memory [`FileProbe`] test double.
#[derive(Default)]
pub struct InMemoryFileProbe {
    files: Mutex<HashMap<String, (String, i64)>>,
}

impl InMemoryFileProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, contents: impl Into<String>, mtime: i64) {
        self.files
            .lock()
            .unwrap()
            .insert(path.into(), (contents.into(), mtime));
    }

    pub fn touch(&self, path: &str, mtime: i64) {
        if let Some(entry) = self.files.lock().unwrap().get_mut(path) {
            entry.1 = mtime;
        }
    }
}

#[async_trait]
impl FileProbe for InMemoryFileProbe {
    async fn read_to_string(&self, path: &str) -> anyhow::Result<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|(contents, _)| contents.clone())
            .ok_or_else(|| anyhow::anyhow!("no such file: {path}"))
    }

    async fn list_cheat_files(&self, search_path: &str) -> anyhow::Result<Vec<String>> {
        let prefix = format!("{}/", search_path.trim_end_matches('/'));
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|p| p.starts_with(&prefix) && p.ends_with(".cheat"))
            .cloned()
            .collect())
    }

    async fn mtime(&self, path: &str) -> anyhow::Result<Option<i64>> {
        Ok(self.files.lock().unwrap().get(path).map(|(_, m)| *m))
    }

    async fn write_to_string(&self, path: &str, contents: &str) -> anyhow::Result<()> {
        let mut files = self.files.lock().unwrap();
        let mtime = files.get(path).map(|(_, m)| *m).unwrap_or(0) + 1;
        files.insert(path.to_string(), (contents.to_string(), mtime));
        Ok(())
    }
}

/// An in-memory [`ChatSink`] test double recording forwarded lines.
#[derive(Default)]
pub struct RecordingChatSink {
    pub sent: Mutex<Vec<String>>,
    pub printed: Mutex<Vec<String>>,
}

impl RecordingChatSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_lines(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatSink for RecordingChatSink {
    async fn send_msg(&self, text: &str) {
        self.sent.lock().unwrap().push(text.to_string());
    }

    async fn print_msg(&self, rich_text: &str) {
        self.printed.lock().unwrap().push(rich_text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_reports_ok_missing_reload() {
        let fs = InMemoryFileProbe::new();
        fs.insert("a.cheat", "/say hi", 10);
        assert_eq!(fs.probe("a.cheat", 10).await.unwrap(), FileProbeResult::Ok);
        assert_eq!(fs.probe("missing.cheat", 10).await.unwrap(), FileProbeResult::Missing);
        fs.touch("a.cheat", 20);
        assert_eq!(fs.probe("a.cheat", 10).await.unwrap(), FileProbeResult::Reload);
    }

    #[tokio::test]
    async fn recording_chat_sink_captures_sent_lines() {
        let sink = RecordingChatSink::new();
        sink.send_msg("/say hi").await;
        assert_eq!(sink.sent_lines(), vec!["/say hi".to_string()]);
    }
}
