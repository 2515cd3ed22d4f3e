//! Bridge between the C engine context and the engine-owned state
//!
//! The context's function table points at the extern "C" functions here;
//! each recovers the [`EngineUserState`] from the context's opaque user
//! pointer and forwards to the indicator engine or broker.

use broker::BrokerSim;
use common::Ts;
use features::{FeatureEngine, FeatureKind};
use plugin::{BarView, EngineCtx, FeatureRef};

/// Engine-owned state reachable from strategy callbacks
pub struct EngineUserState {
    /// Indicator registry and histories
    pub features: FeatureEngine,
    /// Broker simulator
    pub broker: BrokerSim,
}

/// Build a context whose function table routes into `user`.
///
/// The caller must keep `user` alive and pinned at the same address for
/// as long as the context is in use, and must refresh the `user` pointer
/// via [`rebind`] before handing the context out.
pub fn init_ctx(user: &mut EngineUserState) -> EngineCtx {
    EngineCtx {
        bar: BarView::empty(),
        get_feature: ctx_get_feature,
        buy_market: ctx_buy_market,
        sell_market: ctx_sell_market,
        close_all: ctx_close_all,
        equity: ctx_equity,
        balance: ctx_balance,
        position_lots: ctx_position_lots,
        avg_entry: ctx_avg_entry,
        user: std::ptr::from_mut(user).cast(),
    }
}

/// Point the context's opaque pointer back at `user`. Called before every
/// strategy callback so the pointer is always freshly derived.
pub fn rebind(ctx: &mut EngineCtx, user: &mut EngineUserState) {
    ctx.user = std::ptr::from_mut(user).cast();
}

/// # Safety
///
/// `ctx` must be a live context whose `user` points at an `EngineUserState`.
unsafe fn user_state<'a>(ctx: *mut EngineCtx) -> &'a mut EngineUserState {
    // SAFETY: contract above; the engine is single-threaded, so no other
    // reference is live during a callback.
    unsafe { &mut *(*ctx).user.cast::<EngineUserState>() }
}

unsafe extern "C" fn ctx_get_feature(
    ctx: *mut EngineCtx,
    feature_kind: i32,
    period: i32,
) -> FeatureRef {
    let user = unsafe { user_state(ctx) };

    let Some(kind) = FeatureKind::from_code(feature_kind) else {
        return FeatureRef::null();
    };
    let Ok(period) = u32::try_from(period) else {
        return FeatureRef::null();
    };

    user.features
        .history(kind, period)
        .map_or_else(FeatureRef::null, |h| FeatureRef {
            data: h.as_ptr(),
            len: h.len(),
        })
}

unsafe extern "C" fn ctx_buy_market(ctx: *mut EngineCtx, lots: f32, _sl: f32, _tp: f32) -> u64 {
    let bar = unsafe { (*ctx).bar };
    let user = unsafe { user_state(ctx) };
    #[allow(clippy::cast_sign_loss)]
    let ts = Ts::from_nanos(bar.ts as u64);
    user.broker.buy_market(ts, f64::from(bar.close), f64::from(lots))
}

unsafe extern "C" fn ctx_sell_market(ctx: *mut EngineCtx, lots: f32, _sl: f32, _tp: f32) -> u64 {
    let bar = unsafe { (*ctx).bar };
    let user = unsafe { user_state(ctx) };
    #[allow(clippy::cast_sign_loss)]
    let ts = Ts::from_nanos(bar.ts as u64);
    user.broker.sell_market(ts, f64::from(bar.close), f64::from(lots))
}

unsafe extern "C" fn ctx_close_all(ctx: *mut EngineCtx) -> u64 {
    let bar = unsafe { (*ctx).bar };
    let user = unsafe { user_state(ctx) };
    #[allow(clippy::cast_sign_loss)]
    let ts = Ts::from_nanos(bar.ts as u64);
    user.broker.close_all(ts, f64::from(bar.close))
}

#[allow(clippy::cast_possible_truncation)]
unsafe extern "C" fn ctx_equity(ctx: *mut EngineCtx) -> f32 {
    unsafe { user_state(ctx) }.broker.equity() as f32
}

#[allow(clippy::cast_possible_truncation)]
unsafe extern "C" fn ctx_balance(ctx: *mut EngineCtx) -> f32 {
    unsafe { user_state(ctx) }.broker.balance() as f32
}

#[allow(clippy::cast_possible_truncation)]
unsafe extern "C" fn ctx_position_lots(ctx: *mut EngineCtx) -> f32 {
    unsafe { user_state(ctx) }.broker.position_lots() as f32
}

#[allow(clippy::cast_possible_truncation)]
unsafe extern "C" fn ctx_avg_entry(ctx: *mut EngineCtx) -> f32 {
    unsafe { user_state(ctx) }.broker.avg_entry() as f32
}
