//! The scene-tree types consumed from the (external) scene loader: layer
//! tree, draw rules, and style parameters. Nothing here parses YAML — the
//! loader hands these structures in already built.

use crate::expr::filter::Filter;
use crate::value::Value;

/// A zoom-indexed piecewise-linear interpolation, used for zoom-dependent
/// style values (`Stops` in the glossary).
#[derive(Debug, Clone, Default)]
pub struct Stops {
    pub pairs: Vec<(f32, f32)>,
}

impl Stops {
    pub fn new(pairs: Vec<(f32, f32)>) -> Self {
        let mut pairs = pairs;
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        Stops { pairs }
    }

    /// Linear interpolation at `zoom`, clamped to the first/last stop.
    pub fn eval(&self, zoom: f32) -> Option<f32> {
        if self.pairs.is_empty() {
            return None;
        }
        if zoom <= self.pairs[0].0 {
            return Some(self.pairs[0].1);
        }
        if zoom >= self.pairs[self.pairs.len() - 1].0 {
            return Some(self.pairs[self.pairs.len() - 1].1);
        }
        for w in self.pairs.windows(2) {
            let (z0, v0) = w[0];
            let (z1, v1) = w[1];
            if zoom >= z0 && zoom <= z1 {
                let t = if z1 > z0 { (zoom - z0) / (z1 - z0) } else { 0.0 };
                return Some(v0 + (v1 - v0) * t);
            }
        }
        None
    }
}

/// An index into the scene's compiled JS function table, assigned by
/// `ExpressionEngine::set_functions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JsFunctionIndex(pub u32);

/// The closed set of style parameter keys. New style keys are added here,
/// never as free-form strings, so `DrawRule`'s dense array stays exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StyleParamKey {
    Color,
    Width,
    Order,
    Priority,
    Visible,
    Cap,
    Join,
    MiterLimit,
    Extrude,
    Height,
    MinHeight,
    Outline,
    Style,
}

pub const STYLE_PARAM_KEY_COUNT: usize = 13;

impl StyleParamKey {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn all() -> [StyleParamKey; STYLE_PARAM_KEY_COUNT] {
        use StyleParamKey::*;
        [
            Color, Width, Order, Priority, Visible, Cap, Join, MiterLimit, Extrude, Height,
            MinHeight, Outline, Style,
        ]
    }

    /// A required key whose function/stops evaluation yields no usable
    /// value invalidates the whole rule rather than merely clearing the
    /// slot — a style can't draw a line with no width or fill with no
    /// color.
    pub fn is_required(self) -> bool {
        matches!(self, StyleParamKey::Color | StyleParamKey::Width)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StyleParamValue {
    None,
    Bool(bool),
    F32(f32),
    U32(u32),
    String(String),
    Vec2(f32, f32),
    Width { value: f32, unit_is_meters: bool },
}

impl StyleParamValue {
    pub fn as_value(&self) -> Value {
        match self {
            StyleParamValue::None => Value::None,
            StyleParamValue::Bool(b) => Value::Bool(*b),
            StyleParamValue::F32(f) => Value::Number(*f as f64),
            StyleParamValue::U32(u) => Value::Number(*u as f64),
            StyleParamValue::String(s) => Value::String(std::rc::Rc::from(s.as_str())),
            StyleParamValue::Vec2(..) | StyleParamValue::Width { .. } => Value::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StyleParam {
    pub key: StyleParamKey,
    pub value: StyleParamValue,
    pub stops: Option<Stops>,
    pub function: Option<JsFunctionIndex>,
}

impl StyleParam {
    pub fn static_value(key: StyleParamKey, value: StyleParamValue) -> Self {
        StyleParam {
            key,
            value,
            stops: None,
            function: None,
        }
    }
}

/// One named, filtered rule attached to a `SceneLayer`. Parameters are kept
/// sorted by key so merge order is deterministic.
#[derive(Debug, Clone)]
pub struct DrawRuleData {
    pub style_name: String,
    pub id: i64,
    pub parameters: Vec<StyleParam>,
}

impl DrawRuleData {
    pub fn new(style_name: impl Into<String>, id: i64, mut parameters: Vec<StyleParam>) -> Self {
        parameters.sort_by_key(|p| p.key);
        DrawRuleData {
            style_name: style_name.into(),
            id,
            parameters,
        }
    }
}

/// A node in the declarative scene layer tree.
#[derive(Debug, Clone)]
pub struct SceneLayer {
    pub name: String,
    pub filter: Filter,
    pub rules: Vec<DrawRuleData>,
    pub sublayers: Vec<SceneLayer>,
    pub enabled: bool,
    pub exclusive: bool,
}

impl SceneLayer {
    pub fn new(name: impl Into<String>, filter: Filter) -> Self {
        SceneLayer {
            name: name.into(),
            filter,
            rules: Vec::new(),
            sublayers: Vec::new(),
            enabled: true,
            exclusive: false,
        }
    }
}
