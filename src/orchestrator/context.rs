//! Bundler context lifecycle.
//!
//! ```text
//! Cold ──create──► WarmReusable ◄──────────────┐
//!                      │ entry set/options change │
//!                      ▼                          │
//!                  WarmStale ──dispose+create─────┘
//! ```

use crate::bundler::{BundleContext, BundleRequest, Bundler};
use crate::debug;
use crate::error::BuildError;

/// Context state observed at the start of a real build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// No context yet.
    Cold,
    /// Existing context serves the request as is.
    WarmReusable,
    /// Existing context was created for a different request.
    WarmStale,
}

impl ContextState {
    pub fn of(active: Option<&dyn BundleContext>, request: &BundleRequest) -> Self {
        match active {
            None => Self::Cold,
            Some(ctx) if serves(ctx.request(), request) => Self::WarmReusable,
            Some(_) => Self::WarmStale,
        }
    }
}

/// Entry sets compare as sets; a non-empty symmetric difference is stale.
fn serves(current: &BundleRequest, wanted: &BundleRequest) -> bool {
    current.entry_ids() == wanted.entry_ids()
        && current.stubs == wanted.stubs
        && current.minify == wanted.minify
        && current.out_dir == wanted.out_dir
}

/// Bring `slot` to a context serving `request`.
///
/// Returns the state found and the context to rebuild with.
pub fn ensure_context<'a>(
    slot: &'a mut Option<Box<dyn BundleContext>>,
    bundler: &dyn Bundler,
    request: BundleRequest,
) -> Result<(ContextState, &'a mut dyn BundleContext), BuildError> {
    let state = ContextState::of(slot.as_deref(), &request);
    let context = match slot.take() {
        Some(current) if state == ContextState::WarmReusable => current,
        stale => {
            if let Some(stale) = stale {
                debug!("bundle"; "entry set changed, disposing context");
                stale.dispose();
            }
            bundler
                .context(request)
                .map_err(|e| BuildError::Bundle(format!("{e:#}")))?
        }
    };
    Ok((state, slot.insert(context).as_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{BundleResult, EntryPoint};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        created: AtomicUsize,
        disposed: Arc<AtomicUsize>,
    }

    struct Ctx {
        request: BundleRequest,
        disposed: Arc<AtomicUsize>,
    }

    impl BundleContext for Ctx {
        fn request(&self) -> &BundleRequest {
            &self.request
        }
        fn rebuild(&mut self) -> anyhow::Result<BundleResult> {
            Ok(BundleResult::default())
        }
        fn dispose(self: Box<Self>) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Bundler for Counting {
        fn analyze(&self, _: &BundleRequest) -> anyhow::Result<BundleResult> {
            Ok(BundleResult::default())
        }
        fn context(&self, request: BundleRequest) -> anyhow::Result<Box<dyn BundleContext>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Ctx {
                request,
                disposed: self.disposed.clone(),
            }))
        }
    }

    fn request(ids: &[&str]) -> BundleRequest {
        BundleRequest {
            entries: ids.iter().map(|id| EntryPoint::new(*id, *id)).collect(),
            ..BundleRequest::default()
        }
    }

    #[test]
    fn test_lifecycle() {
        let bundler = Counting::default();
        let mut slot = None;

        let (state, _) = ensure_context(&mut slot, &bundler, request(&["/a.tsx", "/b.tsx"])).unwrap();
        assert_eq!(state, ContextState::Cold);

        // Same set in another order is reusable
        let (state, _) = ensure_context(&mut slot, &bundler, request(&["/b.tsx", "/a.tsx"])).unwrap();
        assert_eq!(state, ContextState::WarmReusable);
        assert_eq!(bundler.created.load(Ordering::SeqCst), 1);

        let (state, _) = ensure_context(&mut slot, &bundler, request(&["/a.tsx"])).unwrap();
        assert_eq!(state, ContextState::WarmStale);
        assert_eq!(bundler.created.load(Ordering::SeqCst), 2);
        assert_eq!(bundler.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(slot.unwrap().request().entry_ids().len(), 1);
    }

    #[test]
    fn test_minify_change_is_stale() {
        let bundler = Counting::default();
        let mut slot = None;
        ensure_context(&mut slot, &bundler, request(&["/a.tsx"])).unwrap();
        let mut minified = request(&["/a.tsx"]);
        minified.minify = true;
        let (state, _) = ensure_context(&mut slot, &bundler, minified).unwrap();
        assert_eq!(state, ContextState::WarmStale);
    }

    #[test]
    fn test_stub_table_change_is_stale() {
        let bundler = Counting::default();
        let mut slot = None;
        ensure_context(&mut slot, &bundler, request(&["/a.tsx"])).unwrap();
        let mut stubbed = request(&["/a.tsx"]);
        stubbed.stubs = vec![("/p/actions.ts".into(), "/p/ref/actions.ts.stub.js".into())];
        let (state, _) = ensure_context(&mut slot, &bundler, stubbed).unwrap();
        assert_eq!(state, ContextState::WarmStale);
        assert_eq!(bundler.disposed.load(Ordering::SeqCst), 1);
    }
}
