use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::model::{AudioAnalysis, LyricsAnalysis, Project};
use crate::settings::AppSettings;

// ── Application State ──────────────────────────────────────────────

/// Everything a capability may touch, shared between the dispatcher, script
/// runs and the HTTP API. Capabilities receive it explicitly; there is no
/// global "current project".
pub struct AppState {
    /// The editor's timeline data. The only shared mutable resource.
    pub project: Mutex<Project>,
    /// Read-only audio analysis for the current song, if one was run.
    pub analysis: Mutex<Option<AudioAnalysis>>,
    /// Read-only aligned lyrics, if available.
    pub lyrics: Mutex<Option<LyricsAnalysis>>,
    pub settings: Mutex<AppSettings>,
}

impl AppState {
    pub fn new(project: Project, settings: AppSettings) -> Self {
        Self {
            project: Mutex::new(project),
            analysis: Mutex::new(None),
            lyrics: Mutex::new(None),
            settings: Mutex::new(settings),
        }
    }

    pub fn with_analysis_data(self, analysis: Option<AudioAnalysis>) -> Self {
        *self.analysis.lock() = analysis;
        self
    }

    pub fn with_lyrics_data(self, lyrics: Option<LyricsAnalysis>) -> Self {
        *self.lyrics.lock() = lyrics;
        self
    }

    /// Read-only access to the project. Locks the mutex for the duration of `f`.
    pub fn with_project<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Project) -> R,
    {
        let guard = self.project.lock();
        f(&guard)
    }

    /// Mutating access to the project. Locks the mutex for the duration of `f`.
    pub fn with_project_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Project) -> R,
    {
        let mut guard = self.project.lock();
        f(&mut guard)
    }

    pub fn with_analysis<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Option<&AudioAnalysis>) -> R,
    {
        let guard = self.analysis.lock();
        f(guard.as_ref())
    }

    pub fn with_lyrics<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Option<&LyricsAnalysis>) -> R,
    {
        let guard = self.lyrics.lock();
        f(guard.as_ref())
    }

    pub fn settings_snapshot(&self) -> AppSettings {
        self.settings.lock().clone()
    }
}

// ── Cancellation ───────────────────────────────────────────────────

/// Cooperative cancellation flag for one script run. Raised when the run's
/// deadline passes; the interpreter polls it every step and capabilities
/// check it under the project lock before mutating.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
