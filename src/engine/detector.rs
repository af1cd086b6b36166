// Wingmate Engine — Entity Change Detector
// Computes a cheap identity fingerprint from surface snapshots and reports
// a change only when it differs from the last one observed. Both detection
// channels (mutation notifications and the poll interval) feed the same
// idempotent check, so neither can race the other with different logic.
//
// A surface mid-render may yield a transient, incorrect fingerprint; that
// is not filtered here — the extraction retry policy absorbs it.

use log::debug;
use tokio::sync::mpsc;

use crate::atoms::constants::FINGERPRINT_MAX_CHARS;
use crate::atoms::types::{RawSnapshot, SurfaceView};

// ── Fingerprinting ─────────────────────────────────────────────────────────

/// Truncated raw-text digest of whatever identity the snapshot exposes.
/// Discovery view: concatenated profile text. Conversation view: the
/// counterpart's name (a conversation swap is an identity change).
pub fn fingerprint(snapshot: &RawSnapshot) -> Option<String> {
    let text = match snapshot.view {
        SurfaceView::Discovery => {
            let profile = snapshot.profile.as_ref()?;
            let mut parts: Vec<String> = Vec::new();
            if let Some(name) = &profile.name {
                parts.push(name.clone());
            }
            if let Some(age) = profile.age {
                parts.push(age.to_string());
            }
            if let Some(bio) = &profile.bio {
                parts.push(bio.clone());
            }
            parts.join(" ")
        }
        SurfaceView::Conversation => snapshot
            .conversation
            .as_ref()?
            .counterpart_name
            .clone()
            .unwrap_or_default(),
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(FINGERPRINT_MAX_CHARS).collect())
}

// ── Detector ───────────────────────────────────────────────────────────────

/// Deduplicating change detector. `check` is idempotent: feeding the same
/// snapshot any number of times reports at most one change.
#[derive(Default)]
pub struct ChangeDetector {
    last_fingerprint: Option<String>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new fingerprint when the snapshot's identity differs
    /// from the last observed one; `None` on no-op (unchanged or no
    /// identity exposed yet).
    pub fn check(&mut self, snapshot: &RawSnapshot) -> Option<String> {
        let fp = fingerprint(snapshot)?;
        if self.last_fingerprint.as_deref() == Some(fp.as_str()) {
            return None;
        }
        debug!(
            "[detector] identity changed: {:?} -> {:?}",
            self.last_fingerprint, fp
        );
        self.last_fingerprint = Some(fp.clone());
        Some(fp)
    }

    /// Forget the last fingerprint so the next check re-detects the current
    /// identity (used when a feature toggle forces a re-run).
    pub fn reset(&mut self) {
        self.last_fingerprint = None;
    }

    pub fn last_fingerprint(&self) -> Option<&str> {
        self.last_fingerprint.as_deref()
    }
}

// ── Detection channels ─────────────────────────────────────────────────────

/// Handle for pushing surface mutation notifications into the detector task.
/// Cheap to clone; dropping all senders ends the mutation channel but the
/// poll safety net keeps running.
#[derive(Clone)]
pub struct MutationFeed {
    tx: mpsc::Sender<()>,
}

impl MutationFeed {
    pub fn channel(capacity: usize) -> (MutationFeed, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        (MutationFeed { tx }, rx)
    }

    /// Notify the detector that the surface mutated. Lossy by design: if the
    /// channel is full a check is already pending, which covers this event.
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}
