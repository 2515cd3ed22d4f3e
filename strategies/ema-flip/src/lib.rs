//! EMA crossover flip strategy, built as a loadable engine plugin
//!
//! Goes long when the close crosses above its EMA and short when it
//! crosses below, always flat first, with fixed lots from the params.
//! Does nothing while the EMA is warming up.

#![allow(unsafe_code)] // exports the C plugin contract

use plugin::{EngineCtx, FEATURE_EMA, StrategyHandle};
use serde::Deserialize;
use std::ffi::{CStr, c_char};

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Params {
    ema_period: i32,
    lots: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            ema_period: 50,
            lots: 0.10,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Signal {
    GoLong,
    GoShort,
}

/// A flip fires only when the close/EMA relationship inverts.
fn crossover(prev_close: f32, prev_ema: f32, close: f32, ema: f32) -> Option<Signal> {
    if prev_close.is_nan() || prev_ema.is_nan() || ema.is_nan() {
        return None;
    }
    let prev_above = prev_close > prev_ema;
    let now_above = close > ema;
    if prev_above == now_above {
        return None;
    }
    Some(if now_above {
        Signal::GoLong
    } else {
        Signal::GoShort
    })
}

struct EmaFlip {
    params: Params,
    prev_close: f32,
    prev_ema: f32,
    started: bool,
}

impl EmaFlip {
    fn new(params: Params) -> Self {
        Self {
            params,
            prev_close: f32::NAN,
            prev_ema: f32::NAN,
            started: false,
        }
    }

    fn on_bar(&mut self, ctx: &mut EngineCtx) {
        if !self.started {
            return;
        }

        let i = ctx.bar.index;
        let close = ctx.bar.close;

        let ema_now = {
            let ema = ctx.feature(FEATURE_EMA, self.params.ema_period);
            if i >= ema.len() {
                return;
            }
            ema[i]
        };
        if ema_now.is_nan() {
            return;
        }

        match crossover(self.prev_close, self.prev_ema, close, ema_now) {
            Some(Signal::GoLong) => {
                let pos = ctx.net_lots();
                if pos < 0.0 {
                    ctx.flatten();
                }
                if pos <= 0.0 {
                    ctx.buy(self.params.lots);
                }
            }
            Some(Signal::GoShort) => {
                let pos = ctx.net_lots();
                if pos > 0.0 {
                    ctx.flatten();
                }
                if pos >= 0.0 {
                    ctx.sell(self.params.lots);
                }
            }
            None => {}
        }

        self.prev_close = close;
        self.prev_ema = ema_now;
    }
}

fn parse_params(params: *const c_char) -> Params {
    if params.is_null() {
        return Params::default();
    }
    // SAFETY: the engine passes a NUL-terminated string.
    let raw = unsafe { CStr::from_ptr(params) }.to_string_lossy();
    serde_json::from_str(&raw).unwrap_or_default()
}

/// # Safety
///
/// `params` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strategy_create(params: *const c_char) -> StrategyHandle {
    let state = EmaFlip::new(parse_params(params));
    Box::into_raw(Box::new(state)).cast()
}

/// # Safety
///
/// `handle` must come from `strategy_create` and not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strategy_destroy(handle: StrategyHandle) {
    if !handle.is_null() {
        // SAFETY: round-trips the box allocated in strategy_create.
        drop(unsafe { Box::from_raw(handle.cast::<EmaFlip>()) });
    }
}

/// # Safety
///
/// `handle` must be a live handle from `strategy_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strategy_on_start(handle: StrategyHandle, _ctx: *mut EngineCtx) {
    // SAFETY: contract above.
    let state = unsafe { &mut *handle.cast::<EmaFlip>() };
    state.prev_close = f32::NAN;
    state.prev_ema = f32::NAN;
    state.started = true;
}

/// # Safety
///
/// `handle` must be live and `ctx` a valid engine context for this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strategy_on_bar(handle: StrategyHandle, ctx: *mut EngineCtx) {
    // SAFETY: contract above.
    let state = unsafe { &mut *handle.cast::<EmaFlip>() };
    // SAFETY: the engine keeps ctx valid for the duration of the callback.
    let ctx = unsafe { &mut *ctx };
    state.on_bar(ctx);
}

/// # Safety
///
/// `handle` must be live and `ctx` a valid engine context for this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strategy_on_end(_handle: StrategyHandle, ctx: *mut EngineCtx) {
    // SAFETY: the engine keeps ctx valid for the duration of the callback.
    let ctx = unsafe { &mut *ctx };
    ctx.flatten();
}
