//! Draw-rule matching and merging: walks the scene layer tree depth-first
//! per feature, merges matching rules into a dense per-key accumulator, and
//! evaluates JS-function/stops-backed parameters.

use std::collections::HashMap;

use crate::expr::{ExpressionEngine, StyleContext};
use crate::geometry::Feature;
use crate::scene::{SceneLayer, StyleParamKey, StyleParamValue, Stops, STYLE_PARAM_KEY_COUNT};
use crate::value::Properties;

#[derive(Debug, Clone)]
pub struct DrawRuleSlot {
    pub value: StyleParamValue,
    pub stops: Option<Stops>,
    pub function: Option<crate::scene::JsFunctionIndex>,
    pub source_layer_name: String,
    pub depth: i32,
}

/// The merged, per-feature draw rule: a dense array indexed by
/// `StyleParamKey`, so lookups are a direct index rather than a search.
#[derive(Debug, Clone)]
pub struct DrawRule {
    pub style_name: String,
    pub id: i64,
    slots: [Option<DrawRuleSlot>; STYLE_PARAM_KEY_COUNT],
}

impl DrawRule {
    fn new(style_name: String, id: i64) -> Self {
        DrawRule {
            style_name,
            id,
            slots: std::array::from_fn(|_| None),
        }
    }

    pub fn get(&self, key: StyleParamKey) -> Option<&DrawRuleSlot> {
        self.slots[key.index()].as_ref()
    }

    /// Merges one layer's rule data in. A parameter overwrites the current
    /// slot only when the slot is unset or `depth` is strictly greater than
    /// the slot's recorded depth — first-write-wins otherwise. Ported
    /// directly from the merge condition in the original `DrawRule::merge`.
    fn merge(&mut self, rule: &crate::scene::DrawRuleData, layer_name: &str, depth: i32) {
        for param in &rule.parameters {
            let slot = &mut self.slots[param.key.index()];
            let should_overwrite = match slot {
                None => true,
                Some(existing) => depth > existing.depth,
            };
            if should_overwrite {
                *slot = Some(DrawRuleSlot {
                    value: param.value.clone(),
                    stops: param.stops.clone(),
                    function: param.function,
                    source_layer_name: layer_name.to_string(),
                    depth,
                });
            }
        }
    }

    /// Resolves every function/stops-backed parameter against the current
    /// feature and zoom. Returns `false` (the rule is invalidated) if a
    /// required parameter evaluates to `none`, or if `visible` is false.
    fn evaluate(&mut self, ctx: &StyleContext, engine: &mut dyn ExpressionEngine) -> bool {
        for key in StyleParamKey::all() {
            let Some(slot) = &mut self.slots[key.index()] else {
                continue;
            };
            if let Some(stops) = &slot.stops {
                if let Some(v) = stops.eval(ctx.zoom) {
                    slot.value = StyleParamValue::F32(v);
                }
            } else if let Some(function) = slot.function {
                let mut value = slot.value.clone();
                if engine.eval_style(function, key, &mut value) {
                    slot.value = value;
                } else if key.is_required() {
                    return false;
                } else {
                    slot.value = StyleParamValue::None;
                }
            }
        }

        if let Some(visible) = self.get(StyleParamKey::Visible) {
            if matches!(visible.value, StyleParamValue::Bool(false)) {
                return false;
            }
        }
        true
    }
}

impl Default for DrawRuleSlot {
    fn default() -> Self {
        DrawRuleSlot {
            value: StyleParamValue::None,
            stops: None,
            function: None,
            source_layer_name: String::new(),
            depth: i32::MIN,
        }
    }
}

struct Frame<'a> {
    layer: &'a SceneLayer,
    depth: i32,
}

/// Walks `root` depth-first for `feature`, merging every matching layer's
/// rules into an accumulator keyed by `(rule.id, style_name)`, then
/// evaluates and returns the resulting rules.
pub struct RuleMatcher;

impl RuleMatcher {
    pub fn match_feature(
        root: &SceneLayer,
        feature: &Feature,
        ctx: &StyleContext,
        engine: &mut dyn ExpressionEngine,
    ) -> Vec<DrawRule> {
        let mut accumulator: HashMap<(i64, String), DrawRule> = HashMap::new();
        let mut stack = vec![Frame { layer: root, depth: 1 }];

        while let Some(Frame { layer, depth }) = stack.pop() {
            if !layer.enabled {
                continue;
            }
            if !layer.filter.eval(&feature.props, ctx, engine) {
                continue;
            }

            for rule in &layer.rules {
                let key = (rule.id, rule.style_name.clone());
                let entry = accumulator
                    .entry(key)
                    .or_insert_with(|| DrawRule::new(rule.style_name.clone(), rule.id));
                entry.merge(rule, &layer.name, depth);
            }

            for sublayer in &layer.sublayers {
                if !sublayer.enabled {
                    continue;
                }
                if sublayer.filter.eval(&feature.props, ctx, engine) {
                    stack.push(Frame {
                        layer: sublayer,
                        depth: depth + 1,
                    });
                    if sublayer.exclusive {
                        break;
                    }
                }
            }
        }

        accumulator
            .into_values()
            .filter_map(|mut rule| if rule.evaluate(ctx, engine) { Some(rule) } else { None })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::engine::NullEngine;
    use crate::expr::Filter;
    use crate::geometry::{GeometryType, Point};
    use crate::id::TileSourceId;
    use crate::scene::{DrawRuleData, StyleParam};

    fn color_param(hex: u32) -> StyleParam {
        StyleParam::static_value(StyleParamKey::Color, StyleParamValue::U32(hex))
    }

    #[test]
    fn deeper_sublayer_wins_merge_and_keeps_its_source_name() {
        let mut root = SceneLayer::new("root", Filter::Nop);
        root.rules.push(DrawRuleData::new("fill", 1, vec![color_param(0x00ff0000)]));

        let mut sub = SceneLayer::new("buildings", Filter::Nop);
        sub.rules.push(DrawRuleData::new("fill", 1, vec![color_param(0x0000ff00)]));
        root.sublayers.push(sub);

        let feature = Feature::lines(
            vec![vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]],
            Properties::new(),
            TileSourceId(1),
        );
        let ctx = StyleContext::new(10.0, GeometryType::Lines, 1.0);
        let mut engine = NullEngine;

        let rules = RuleMatcher::match_feature(&root, &feature, &ctx, &mut engine);
        assert_eq!(rules.len(), 1);
        let color_slot = rules[0].get(StyleParamKey::Color).unwrap();
        assert_eq!(color_slot.value, StyleParamValue::U32(0x0000ff00));
        assert_eq!(color_slot.source_layer_name, "buildings");
    }

    #[test]
    fn failed_required_function_param_invalidates_the_rule() {
        let mut root = SceneLayer::new("root", Filter::Nop);
        let color_fn = StyleParam {
            key: StyleParamKey::Color,
            value: StyleParamValue::None,
            stops: None,
            function: Some(crate::scene::JsFunctionIndex(0)),
        };
        root.rules.push(DrawRuleData::new("fill", 1, vec![color_fn]));

        let feature = Feature::lines(
            vec![vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]],
            Properties::new(),
            TileSourceId(1),
        );
        let ctx = StyleContext::new(10.0, GeometryType::Lines, 1.0);
        let mut engine = NullEngine;

        // `NullEngine::eval_style` always reports failure, so a required
        // function-backed color param must drop the rule entirely rather
        // than merge it in with an unset color.
        let rules = RuleMatcher::match_feature(&root, &feature, &ctx, &mut engine);
        assert!(rules.is_empty());
    }

    #[test]
    fn exclusive_sublayer_stops_after_first_match() {
        let mut root = SceneLayer::new("root", Filter::Nop);
        let mut a = SceneLayer::new("a", Filter::Nop);
        a.exclusive = true;
        a.rules.push(DrawRuleData::new("fill", 1, vec![color_param(0x00ff0000)]));
        let mut b = SceneLayer::new("b", Filter::Nop);
        b.rules.push(DrawRuleData::new("fill", 2, vec![color_param(0x0000ff00)]));
        root.sublayers.push(a);
        root.sublayers.push(b);
        // `exclusive` is declared on the sibling layer itself in this model:
        // after pushing `a` (exclusive) the walk stops before visiting `b`.

        let feature = Feature::lines(
            vec![vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]],
            Properties::new(),
            TileSourceId(1),
        );
        let ctx = StyleContext::new(10.0, GeometryType::Lines, 1.0);
        let mut engine = NullEngine;
        let rules = RuleMatcher::match_feature(&root, &feature, &ctx, &mut engine);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, 1);
    }
}
