//! C-compatible engine context
//!
//! The layout of every type here is part of the plugin ABI; strategies
//! compiled against one engine version must keep working against another.

use std::ffi::{c_char, c_void};

/// Feature code for the EMA family
pub const FEATURE_EMA: i32 = 1;

/// Feature code for the Wilder ATR family
pub const FEATURE_ATR: i32 = 2;

/// The bar currently being replayed
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BarView {
    /// Bar timestamp, nanoseconds
    pub ts: i64,
    /// Open price
    pub open: f32,
    /// High price
    pub high: f32,
    /// Low price
    pub low: f32,
    /// Close price
    pub close: f32,
    /// Traded volume
    pub volume: f32,
    /// Bar index in this run, starting at 0
    pub index: usize,
}

impl BarView {
    /// A zeroed view, used before the first bar
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            ts: 0,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            volume: 0.0,
            index: 0,
        }
    }
}

/// Read-only view into an indicator's per-bar history array
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FeatureRef {
    /// First element, or null when the feature is unknown
    pub data: *const f32,
    /// Element count
    pub len: usize,
}

impl FeatureRef {
    /// The null view returned for unknown features
    #[must_use]
    pub const fn null() -> Self {
        Self {
            data: std::ptr::null(),
            len: 0,
        }
    }
}

/// Opaque per-strategy state owned by the plugin
pub type StrategyHandle = *mut c_void;

/// `strategy_create(params)` export
pub type FnCreate = unsafe extern "C" fn(params: *const c_char) -> StrategyHandle;

/// `strategy_destroy(handle)` export
pub type FnDestroy = unsafe extern "C" fn(handle: StrategyHandle);

/// `strategy_on_start` / `strategy_on_bar` / `strategy_on_end` exports
pub type FnLifecycle = unsafe extern "C" fn(handle: StrategyHandle, ctx: *mut EngineCtx);

/// Feature accessor in the engine's function table
pub type FnGetFeature =
    unsafe extern "C" fn(ctx: *mut EngineCtx, feature_kind: i32, period: i32) -> FeatureRef;

/// Market order entry in the engine's function table; `sl`/`tp` are
/// reserved and may be ignored by the broker
pub type FnOrder = unsafe extern "C" fn(ctx: *mut EngineCtx, lots: f32, sl: f32, tp: f32) -> u64;

/// Close-everything entry in the engine's function table
pub type FnCloseAll = unsafe extern "C" fn(ctx: *mut EngineCtx) -> u64;

/// Scalar account query in the engine's function table
pub type FnQuery = unsafe extern "C" fn(ctx: *mut EngineCtx) -> f32;

/// The engine context: current bar, function table, opaque engine state.
///
/// Strategies receive a pointer to this on every callback. The `user`
/// pointer belongs to the engine and must not be dereferenced.
#[repr(C)]
pub struct EngineCtx {
    /// The bar being replayed
    pub bar: BarView,

    /// Read an indicator history by (kind, period)
    pub get_feature: FnGetFeature,

    /// Buy at market
    pub buy_market: FnOrder,
    /// Sell at market
    pub sell_market: FnOrder,
    /// Close the net position
    pub close_all: FnCloseAll,

    /// Current equity
    pub equity: FnQuery,
    /// Current balance
    pub balance: FnQuery,
    /// Signed net position in lots
    pub position_lots: FnQuery,
    /// Average entry price, NaN when flat
    pub avg_entry: FnQuery,

    /// Engine-owned pointer; opaque to strategies
    pub user: *mut c_void,
}

impl EngineCtx {
    /// Indicator history by (kind, period); empty when unknown.
    ///
    /// The returned view is only valid for the duration of the current
    /// callback, which the borrow on `self` enforces for safe callers.
    #[must_use]
    pub fn feature(&mut self, kind: i32, period: i32) -> &[f32] {
        let ptr = std::ptr::from_mut(self);
        // SAFETY: the function table is populated by the engine before any
        // callback runs and the view it returns outlives this borrow.
        let fr = unsafe { (self.get_feature)(ptr, kind, period) };
        if fr.data.is_null() || fr.len == 0 {
            &[]
        } else {
            // SAFETY: non-null view handed out by the engine.
            unsafe { std::slice::from_raw_parts(fr.data, fr.len) }
        }
    }

    /// Buy `lots` at market; returns the fill id, 0 on no-op
    pub fn buy(&mut self, lots: f64) -> u64 {
        let ptr = std::ptr::from_mut(self);
        // SAFETY: table populated by the engine.
        unsafe { (self.buy_market)(ptr, lots as f32, 0.0, 0.0) }
    }

    /// Sell `lots` at market; returns the fill id, 0 on no-op
    pub fn sell(&mut self, lots: f64) -> u64 {
        let ptr = std::ptr::from_mut(self);
        // SAFETY: table populated by the engine.
        unsafe { (self.sell_market)(ptr, lots as f32, 0.0, 0.0) }
    }

    /// Close the net position; returns the fill id, 0 when flat
    pub fn flatten(&mut self) -> u64 {
        let ptr = std::ptr::from_mut(self);
        // SAFETY: table populated by the engine.
        unsafe { (self.close_all)(ptr) }
    }

    /// Current equity
    pub fn account_equity(&mut self) -> f32 {
        let ptr = std::ptr::from_mut(self);
        // SAFETY: table populated by the engine.
        unsafe { (self.equity)(ptr) }
    }

    /// Current balance
    pub fn account_balance(&mut self) -> f32 {
        let ptr = std::ptr::from_mut(self);
        // SAFETY: table populated by the engine.
        unsafe { (self.balance)(ptr) }
    }

    /// Signed net position in lots
    pub fn net_lots(&mut self) -> f32 {
        let ptr = std::ptr::from_mut(self);
        // SAFETY: table populated by the engine.
        unsafe { (self.position_lots)(ptr) }
    }

    /// Average entry price, NaN when flat
    pub fn entry_price(&mut self) -> f32 {
        let ptr = std::ptr::from_mut(self);
        // SAFETY: table populated by the engine.
        unsafe { (self.avg_entry)(ptr) }
    }
}
