//! The embedded expression engine boundary. `ExpressionEngine` is
//! implemented once, by `QuickJsEngine`, matching the "single
//! implementation, no virtual hierarchy" redesign of the original's
//! Duktape/JSCore split.

use rquickjs::{Context, Function, Object, Persistent, Runtime};

use crate::errors::TangramError;
use crate::expr::proxy::FeatureProxy;
use crate::scene::{StyleParamKey, StyleParamValue};
use crate::value::Properties;

pub trait ExpressionEngine {
    /// Compiles each source as a top-level function and installs it at a
    /// stable index. A compile error is reported in the returned vector
    /// but does not abort the remaining sources.
    fn set_functions(&mut self, sources: &[String]) -> Vec<Result<crate::scene::JsFunctionIndex, TangramError>>;

    /// Injects the scene's user-supplied global object, frozen.
    fn set_globals(&mut self, globals: Properties);

    /// Points the `feature` proxy at a new feature.
    fn set_feature(&mut self, props: Properties);

    fn eval_filter(&mut self, index: crate::scene::JsFunctionIndex) -> bool;

    fn eval_style(&mut self, index: crate::scene::JsFunctionIndex, key: StyleParamKey, out: &mut StyleParamValue) -> bool;
}

/// A stub engine with no JS runtime, used only in filter/rule unit tests
/// that never exercise a `Function` filter for real.
pub struct NullEngine;

impl ExpressionEngine for NullEngine {
    fn set_functions(&mut self, _sources: &[String]) -> Vec<Result<crate::scene::JsFunctionIndex, TangramError>> {
        Vec::new()
    }
    fn set_globals(&mut self, _globals: Properties) {}
    fn set_feature(&mut self, _props: Properties) {}
    fn eval_filter(&mut self, _index: crate::scene::JsFunctionIndex) -> bool {
        false
    }
    fn eval_style(&mut self, _index: crate::scene::JsFunctionIndex, _key: StyleParamKey, _out: &mut StyleParamValue) -> bool {
        false
    }
}

/// The 16 standard CSS color keywords plus the handful of extra names
/// common in map styles, as a closed table rather than a dependency.
const CSS_COLOR_NAMES: &[(&str, u32)] = &[
    ("black", 0x000000),
    ("silver", 0xc0c0c0),
    ("gray", 0x808080),
    ("white", 0xffffff),
    ("maroon", 0x800000),
    ("red", 0xff0000),
    ("purple", 0x800080),
    ("fuchsia", 0xff00ff),
    ("green", 0x008000),
    ("lime", 0x00ff00),
    ("olive", 0x808000),
    ("yellow", 0xffff00),
    ("navy", 0x000080),
    ("blue", 0x0000ff),
    ("teal", 0x008080),
    ("aqua", 0x00ffff),
    ("orange", 0xffa500),
    ("steelblue", 0x4682b4),
    ("skyblue", 0x87ceeb),
    ("forestgreen", 0x228b22),
];

fn parse_color_string(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        return match hex.len() {
            6 => u32::from_str_radix(hex, 16).ok().map(|rgb| 0xff000000 | rgb),
            8 => u32::from_str_radix(hex, 16).ok(),
            3 => {
                let mut chars = hex.chars();
                let (r, g, b) = (chars.next()?, chars.next()?, chars.next()?);
                let expand = |c: char| c.to_digit(16).map(|d| d * 16 + d);
                let (r, g, b) = (expand(r)?, expand(g)?, expand(b)?);
                Some(0xff000000 | (r << 16) | (g << 8) | b)
            }
            4 => {
                let mut chars = hex.chars();
                let (r, g, b, a) = (chars.next()?, chars.next()?, chars.next()?, chars.next()?);
                let expand = |c: char| c.to_digit(16).map(|d| d * 16 + d);
                let (r, g, b, a) = (expand(r)?, expand(g)?, expand(b)?, expand(a)?);
                Some((a << 24) | (r << 16) | (g << 8) | b)
            }
            _ => None,
        };
    }
    CSS_COLOR_NAMES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(s))
        .map(|(_, argb)| 0xff000000 | argb)
}

/// Packs `[r, g, b(, a)]` components in `0..=1` into an ARGB `u32`, the way
/// the original engine accepts a color function returning a component array
/// instead of a hex string.
fn pack_rgba(r: f64, g: f64, b: f64, a: f64) -> u32 {
    let component = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
    (component(a) << 24) | (component(r) << 16) | (component(g) << 8) | component(b)
}

fn parse_width_string(s: &str) -> Option<(f32, bool)> {
    let s = s.trim();
    if let Some(num) = s.strip_suffix("px") {
        return num.trim().parse::<f32>().ok().map(|v| (v, false));
    }
    if let Some(num) = s.strip_suffix('m') {
        return num.trim().parse::<f32>().ok().map(|v| (v, true));
    }
    s.parse::<f32>().ok().map(|v| (v, false))
}

/// The single `ExpressionEngine` implementation, backed by QuickJS via
/// `rquickjs`. One instance lives per worker thread; it is not `Send`.
pub struct QuickJsEngine {
    _runtime: Runtime,
    context: Context,
    functions: Vec<Option<Persistent<Function<'static>>>>,
    proxy: std::rc::Rc<std::cell::RefCell<FeatureProxy>>,
}

impl QuickJsEngine {
    pub fn new() -> Result<Self, TangramError> {
        let runtime = Runtime::new().map_err(|e| TangramError::FunctionCompile(e.to_string()))?;
        let context = Context::full(&runtime).map_err(|e| TangramError::FunctionCompile(e.to_string()))?;
        let proxy = std::rc::Rc::new(std::cell::RefCell::new(FeatureProxy::new()));

        let proxy_for_get = proxy.clone();
        let proxy_for_has = proxy.clone();

        context
            .with(|ctx| -> Result<(), rquickjs::Error> {
                let globals = ctx.globals();
                let point_const: f64 = crate::geometry::geometry_constant::POINT;
                let line_const: f64 = crate::geometry::geometry_constant::LINE;
                let polygon_const: f64 = crate::geometry::geometry_constant::POLYGON;
                globals.set("point", point_const)?;
                globals.set("line", line_const)?;
                globals.set("polygon", polygon_const)?;

                let get_fn = Function::new(ctx.clone(), move |key: String| -> rquickjs::Value {
                    match proxy_for_get.borrow_mut().get(&key) {
                        Some(crate::value::Value::Number(n)) => rquickjs::Value::new_float(ctx.clone(), n),
                        Some(crate::value::Value::Bool(b)) => rquickjs::Value::new_bool(ctx.clone(), b),
                        Some(crate::value::Value::String(s)) => {
                            rquickjs::String::from_str(ctx.clone(), &s).map(rquickjs::Value::from).unwrap_or(rquickjs::Value::new_undefined(ctx.clone()))
                        }
                        _ => rquickjs::Value::new_undefined(ctx.clone()),
                    }
                })?;
                let has_fn = Function::new(ctx.clone(), move |key: String| -> bool { proxy_for_has.borrow().has(&key) })?;
                globals.set("__tangramFeatureGet", get_fn)?;
                globals.set("__tangramFeatureHas", has_fn)?;

                // The `feature` global proxies property reads/existence checks
                // to the host-side `FeatureProxy` rather than holding a real
                // property bag in the JS heap.
                ctx.eval::<(), _>(
                    br#"
                    globalThis.feature = new Proxy({}, {
                        get(_target, key) { return globalThis.__tangramFeatureGet(String(key)); },
                        has(_target, key) { return globalThis.__tangramFeatureHas(String(key)); },
                    });
                    "#
                    .to_vec(),
                )?;
                Ok(())
            })
            .map_err(|e| TangramError::FunctionCompile(e.to_string()))?;

        Ok(QuickJsEngine {
            _runtime: runtime,
            context,
            functions: Vec::new(),
            proxy,
        })
    }
}

impl ExpressionEngine for QuickJsEngine {
    fn set_functions(&mut self, sources: &[String]) -> Vec<Result<crate::scene::JsFunctionIndex, TangramError>> {
        let mut results = Vec::with_capacity(sources.len());
        for source in sources {
            let compiled = self.context.with(|ctx| {
                ctx.eval::<Function, _>(format!("({source})").into_bytes())
                    .map(|f| Persistent::save(&ctx, f))
            });
            match compiled {
                Ok(persistent) => {
                    let idx = self.functions.len() as u32;
                    self.functions.push(Some(persistent));
                    results.push(Ok(crate::scene::JsFunctionIndex(idx)));
                }
                Err(e) => {
                    log::error!("JS function failed to compile: {e}");
                    self.functions.push(None);
                    results.push(Err(TangramError::FunctionCompile(e.to_string())));
                }
            }
        }
        results
    }

    fn set_globals(&mut self, globals: Properties) {
        let _ = self.context.with(|ctx| -> Result<(), rquickjs::Error> {
            let global_obj = Object::new(ctx.clone())?;
            for (key, value) in globals.iter() {
                match value {
                    crate::value::Value::Bool(b) => global_obj.set(key, *b)?,
                    crate::value::Value::Number(n) => global_obj.set(key, *n)?,
                    crate::value::Value::String(s) => global_obj.set(key, s.as_ref())?,
                    crate::value::Value::None => {}
                }
            }
            ctx.globals().set("global", global_obj)?;
            Ok(())
        });
    }

    fn set_feature(&mut self, props: Properties) {
        self.proxy.borrow_mut().set_feature(props);
    }

    fn eval_filter(&mut self, index: crate::scene::JsFunctionIndex) -> bool {
        let slot = match self.functions.get(index.0 as usize) {
            Some(Some(f)) => f.clone(),
            _ => return false,
        };
        let mut truthy = false;
        self.context.with(|ctx| {
            if let Ok(func) = slot.restore(&ctx) {
                if let Ok(value) = func.call::<_, bool>(()) {
                    truthy = value;
                }
            }
        });
        truthy
    }

    fn eval_style(&mut self, index: crate::scene::JsFunctionIndex, key: StyleParamKey, out: &mut StyleParamValue) -> bool {
        let slot = match self.functions.get(index.0 as usize) {
            Some(Some(f)) => f.clone(),
            _ => return false,
        };

        match key {
            StyleParamKey::Color => {
                let mut color: Option<u32> = None;
                self.context.with(|ctx| {
                    if let Ok(func) = slot.restore(&ctx) {
                        if let Ok(s) = func.call::<_, String>(()) {
                            color = parse_color_string(&s);
                        } else if let Ok(n) = func.call::<_, f64>(()) {
                            color = Some(n as u32);
                        } else if let Ok((r, g, b, a)) = func.call::<_, (f64, f64, f64, f64)>(()) {
                            color = Some(pack_rgba(r, g, b, a));
                        } else if let Ok((r, g, b)) = func.call::<_, (f64, f64, f64)>(()) {
                            color = Some(pack_rgba(r, g, b, 1.0));
                        }
                    }
                });
                match color {
                    Some(c) => {
                        *out = StyleParamValue::U32(c);
                        true
                    }
                    None => false,
                }
            }
            StyleParamKey::Width => {
                let mut width = None;
                self.context.with(|ctx| {
                    if let Ok(func) = slot.restore(&ctx) {
                        if let Ok(n) = func.call::<_, f64>(()) {
                            width = Some((n as f32, false));
                        } else if let Ok(s) = func.call::<_, String>(()) {
                            width = parse_width_string(&s);
                        }
                    }
                });
                match width {
                    Some((value, unit_is_meters)) => {
                        *out = StyleParamValue::Width { value, unit_is_meters };
                        true
                    }
                    None => false,
                }
            }
            StyleParamKey::Order | StyleParamKey::Priority => {
                let mut n = None;
                self.context.with(|ctx| {
                    if let Ok(func) = slot.restore(&ctx) {
                        n = func.call::<_, f64>(()).ok();
                    }
                });
                match n {
                    Some(v) if v.is_finite() && v >= 0.0 => {
                        *out = StyleParamValue::U32(v as u32);
                        true
                    }
                    _ => false,
                }
            }
            StyleParamKey::Visible => {
                let mut truthy = None;
                self.context.with(|ctx| {
                    if let Ok(func) = slot.restore(&ctx) {
                        truthy = func.call::<_, bool>(()).ok();
                    }
                });
                match truthy {
                    Some(b) => {
                        *out = StyleParamValue::Bool(b);
                        true
                    }
                    None => false,
                }
            }
            StyleParamKey::Cap | StyleParamKey::Join | StyleParamKey::Style => {
                let mut s = None;
                self.context.with(|ctx| {
                    if let Ok(func) = slot.restore(&ctx) {
                        s = func.call::<_, String>(()).ok();
                    }
                });
                match s {
                    Some(s) => {
                        *out = StyleParamValue::String(s);
                        true
                    }
                    None => false,
                }
            }
            StyleParamKey::MiterLimit | StyleParamKey::Height | StyleParamKey::MinHeight => {
                let mut n = None;
                self.context.with(|ctx| {
                    if let Ok(func) = slot.restore(&ctx) {
                        n = func.call::<_, f64>(()).ok();
                    }
                });
                match n {
                    Some(v) => {
                        *out = StyleParamValue::F32(v as f32);
                        true
                    }
                    None => false,
                }
            }
            StyleParamKey::Extrude => {
                let mut result = None;
                self.context.with(|ctx| {
                    if let Ok(func) = slot.restore(&ctx) {
                        if let Ok(b) = func.call::<_, bool>(()) {
                            result = Some(if b { (f32::NAN, f32::NAN) } else { (0.0, 0.0) });
                        } else if let Ok(pair) = func.call::<_, (f64, f64)>(()) {
                            result = Some((pair.0 as f32, pair.1 as f32));
                        } else if let Ok(n) = func.call::<_, f64>(()) {
                            result = Some((0.0, n as f32));
                        }
                    }
                });
                match result {
                    Some((lo, hi)) => {
                        *out = StyleParamValue::Vec2(lo, hi);
                        true
                    }
                    None => false,
                }
            }
            StyleParamKey::Outline => {
                let mut truthy = None;
                self.context.with(|ctx| {
                    if let Ok(func) = slot.restore(&ctx) {
                        truthy = func.call::<_, bool>(()).ok();
                    }
                });
                match truthy {
                    Some(b) => {
                        *out = StyleParamValue::Bool(b);
                        true
                    }
                    None => false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_hex_colors() {
        assert_eq!(parse_color_string("#fff"), Some(0xffffffff));
        assert_eq!(parse_color_string("#ff0000"), Some(0xffff0000));
        assert_eq!(parse_color_string("steelblue"), Some(0xff4682b4));
        assert_eq!(parse_color_string("not-a-color"), None);
    }

    #[test]
    fn parses_width_units() {
        assert_eq!(parse_width_string("2px"), Some((2.0, false)));
        assert_eq!(parse_width_string("3m"), Some((3.0, true)));
        assert_eq!(parse_width_string("4"), Some((4.0, false)));
    }
}
