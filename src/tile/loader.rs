//! The loader thread.
//!
//! ```text
//!            ┌──────────── queue empty ───────────┐
//!            ▼                                    │
//!   ┌─────────────────┐  pop item   ┌───────────────────┐
//!   │     Waiting     │ ──────────► │      Running      │
//!   │ (condvar wait)  │ ◄────────── │ (fetch, write,    │
//!   └────────┬────────┘    done     │  notify)          │
//!            │ abort flag           └───────────────────┘
//!            ▼
//!   ┌─────────────────┐
//!   │   Terminated    │
//!   └─────────────────┘
//! ```
//!
//! Exactly one loader runs per collection. It owns a current-thread tokio
//! runtime and drives the source's fetch future to completion before looking
//! at the queue again, so fetches never overlap.

use std::sync::{Arc, PoisonError};

use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::source::TileSource;

use super::cache::ObjectKey;
use super::collection::{LoaderState, Shared};
use super::notify::TileUpdatedEvent;
use super::queue::LoadJob;

/// Run the loader loop until the abort flag is observed.
pub(crate) fn run<S: TileSource>(
    shared: Arc<Shared>,
    source: S,
    runtime: Runtime,
    use_imaging_backend: bool,
) {
    let _exit = ExitGuard::new(&shared, &source, use_imaging_backend);
    info!("Tile loader started");

    loop {
        let item = {
            shared.set_loader_state(LoaderState::Waiting);
            let mut state = shared.lock_state();
            while state.queue.is_empty() {
                state = shared
                    .cv
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }

            if shared.abort_requested() {
                drop(state);
                if let Err(e) = runtime.block_on(source.close()) {
                    warn!(error = %e, "Failed to close tile source");
                }
                info!("Tile loader aborted");
                return;
            }

            match state.queue.pop_min() {
                Some(item) => item,
                None => continue,
            }
        };

        let LoadJob::Fetch {
            key,
            display_whole_image,
        } = item.job
        else {
            // The sentinel is only queued after the flag is set
            continue;
        };

        shared.set_loader_state(LoaderState::Running);
        if load_tile(&shared, &source, &runtime, &key, display_whole_image) {
            let event = TileUpdatedEvent { key };
            for observer in shared.live_observers() {
                observer.tile_updated(event.clone());
            }
        }
    }
}

/// Fetch one tile and write it into its entry under the load lock.
///
/// Returns `true` if an entry was updated.
fn load_tile<S: TileSource>(
    shared: &Shared,
    source: &S,
    runtime: &Runtime,
    key: &ObjectKey,
    display_whole_image: bool,
) -> bool {
    let _fence = shared.lock_fetch();

    // Nobody holds the entry anymore
    if !shared.is_cached(key) {
        debug!(key = %key, "Skipping evicted tile");
        return false;
    }

    let Some(data) = runtime.block_on(source.fetch(key, display_whole_image)) else {
        debug!(key = %key, "Tile source returned no data");
        return false;
    };

    // The entry may have been dropped while the fetch was running
    let Some(entry) = shared.cached(key) else {
        debug!(key = %key, "Tile evicted during fetch");
        return false;
    };

    entry.overwrite(data);
    debug!(key = %key, "Tile loaded");
    true
}

/// Detaches the imaging backend and marks the loader terminated on every
/// exit path, including a panic.
struct ExitGuard<'a, S: TileSource> {
    shared: &'a Shared,
    source: &'a S,
    backend_attached: bool,
}

impl<'a, S: TileSource> ExitGuard<'a, S> {
    fn new(shared: &'a Shared, source: &'a S, use_imaging_backend: bool) -> Self {
        let backend_attached = use_imaging_backend
            && match source.attach_backend() {
                Ok(()) => {
                    debug!("Imaging backend attached");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "Failed to attach imaging backend");
                    false
                }
            };

        Self {
            shared,
            source,
            backend_attached,
        }
    }
}

impl<S: TileSource> Drop for ExitGuard<'_, S> {
    fn drop(&mut self) {
        if self.backend_attached {
            if let Err(e) = self.source.detach_backend() {
                warn!(error = %e, "Failed to detach imaging backend");
            }
        }
        if std::thread::panicking() {
            warn!("Tile loader exiting after panic");
        }
        self.shared.set_loader_state(LoaderState::Terminated);
    }
}
