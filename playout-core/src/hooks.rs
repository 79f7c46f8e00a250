//! Render-observation hooks.
//!
//! Two optional callouts run synchronously on the real-time thread during every render pass:
//!
//! - *did convert*: after samples were pulled from the source, before gain and device write
//! - *did render*: after gain was applied and the samples were written to the device buffer
//!
//! Hooks must not allocate, block or take unbounded time. The output stage cannot check this;
//! it is the installer's obligation.

use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// Describes the render pass a hook is observing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderInfo {
    /// Frames in this pass
    pub frames: usize,
    /// Frames that came from the source; the rest are silence padding
    pub provided_frames: usize,
    /// Samples per frame in the buffer handed to the hook
    pub channels: u16,
    /// Played-frame counter at the start of this pass
    pub sample_time: u64,
}

/// Signature of a render hook: interleaved `f32` samples of the current pass.
pub type RenderHookFn = dyn Fn(&RenderInfo, &mut [f32]) + Send + Sync;

/// Boxed hook, published to the render thread through an atomic pointer swap.
pub struct RenderHook(Box<RenderHookFn>);

impl RenderHook {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(&RenderInfo, &mut [f32]) + Send + Sync + 'static,
    {
        Self(Box::new(hook))
    }

    fn call(&self, info: &RenderInfo, samples: &mut [f32]) {
        (self.0)(info, samples)
    }
}

#[derive(Default)]
pub(crate) struct RenderHooks {
    did_convert: ArcSwapOption<RenderHook>,
    did_render: ArcSwapOption<RenderHook>,
}

impl RenderHooks {
    pub(crate) fn set_did_convert(&self, hook: Option<RenderHook>) {
        self.did_convert.store(hook.map(Arc::new));
    }

    pub(crate) fn set_did_render(&self, hook: Option<RenderHook>) {
        self.did_render.store(hook.map(Arc::new));
    }

    pub(crate) fn did_convert(&self, info: &RenderInfo, samples: &mut [f32]) {
        if let Some(hook) = &*self.did_convert.load() {
            hook.call(info, samples);
        }
    }

    pub(crate) fn did_render(&self, info: &RenderInfo, samples: &mut [f32]) {
        if let Some(hook) = &*self.did_render.load() {
            hook.call(info, samples);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn installed_hooks_run_and_cleared_hooks_do_not() {
        let hooks = RenderHooks::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let info = RenderInfo {
            frames: 4,
            provided_frames: 4,
            channels: 1,
            sample_time: 0,
        };
        let mut samples = [0.0f32; 4];

        hooks.did_convert(&info, &mut samples);
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        let counter = calls.clone();
        hooks.set_did_convert(Some(RenderHook::new(move |info, samples| {
            counter.fetch_add(info.frames, Ordering::Relaxed);
            samples.fill(1.0);
        })));
        hooks.did_convert(&info, &mut samples);
        assert_eq!(calls.load(Ordering::Relaxed), 4);
        assert_eq!(samples, [1.0; 4]);

        hooks.set_did_convert(None);
        hooks.did_convert(&info, &mut samples);
        hooks.did_render(&info, &mut samples);
        assert_eq!(calls.load(Ordering::Relaxed), 4);
    }
}
