//! The declarative filter language: a small tagged-variant tree evaluated
//! against a feature's properties and the current `StyleContext`, with a
//! static cost estimate driving a cheapest-first operand sort.

use crate::expr::context::StyleContext;
use crate::expr::engine::ExpressionEngine;
use crate::scene::JsFunctionIndex;
use crate::value::{Properties, Value};

#[derive(Debug, Clone)]
pub enum Filter {
    All(Vec<Filter>),
    Any(Vec<Filter>),
    None(Vec<Filter>),
    Existence(String, bool),
    EqualitySet(String, Vec<Value>),
    Equality(String, Value),
    Range(String, f64, f64, bool),
    Function(JsFunctionIndex),
    Nop,
}

const COST_EXISTENCE: u32 = 20;
const COST_KEYWORD_COMPARE: u32 = 1;
const COST_LITERAL_COMPARE: u32 = 10;
const COST_FUNCTION: u32 = 1000;
const COST_OPERATOR_BASE: u32 = 100;

impl Filter {
    /// The filter's subject key, for filters that have exactly one. Used
    /// only to break cost ties in `sort` (prefer `$zoom` over `$geometry`).
    fn key(&self) -> Option<&str> {
        match self {
            Filter::Existence(k, _) | Filter::EqualitySet(k, _) | Filter::Equality(k, _) | Filter::Range(k, ..) => {
                Some(k.as_str())
            }
            _ => None,
        }
    }

    /// Static cost estimate, cheapest-first. Keyword-keyed compares are
    /// assumed resolvable without touching feature properties and so cost
    /// less than literal property compares.
    pub fn cost(&self) -> u32 {
        match self {
            Filter::Nop => 0,
            Filter::Existence(..) => COST_EXISTENCE,
            Filter::EqualitySet(k, _) | Filter::Equality(k, _) | Filter::Range(k, ..) => {
                if StyleContext::is_keyword(k) {
                    COST_KEYWORD_COMPARE
                } else {
                    COST_LITERAL_COMPARE
                }
            }
            Filter::Function(_) => COST_FUNCTION,
            Filter::All(children) | Filter::Any(children) | Filter::None(children) => {
                COST_OPERATOR_BASE + children.iter().map(Filter::cost).sum::<u32>()
            }
        }
    }

    /// Recursively sorts operator children cheapest-first; ties between
    /// two keyed (non-operator) filters are broken by key name descending,
    /// so `$zoom` sorts before `$geometry`.
    pub fn sort(&mut self) {
        if let Filter::All(children) | Filter::Any(children) | Filter::None(children) = self {
            for child in children.iter_mut() {
                child.sort();
            }
            children.sort_by(|a, b| {
                a.cost().cmp(&b.cost()).then_with(|| match (a.key(), b.key()) {
                    (Some(ka), Some(kb)) => kb.cmp(ka),
                    _ => std::cmp::Ordering::Equal,
                })
            });
        }
    }

    pub fn eval(&self, props: &Properties, ctx: &StyleContext, engine: &mut dyn ExpressionEngine) -> bool {
        match self {
            Filter::Nop => true,
            Filter::Existence(key, expected) => {
                let exists = ctx.resolve_keyword(key).is_some() || props.contains(key);
                exists == *expected
            }
            Filter::Equality(key, expected) => match lookup(key, props, ctx) {
                Some(v) => v == *expected,
                None => false,
            },
            Filter::EqualitySet(key, set) => match lookup(key, props, ctx) {
                Some(v) => set.iter().any(|candidate| *candidate == v),
                None => false,
            },
            Filter::Range(key, min, max, has_pixel_area) => match lookup(key, props, ctx).and_then(|v| v.as_f64()) {
                Some(x) => {
                    let (lo, hi) = if *has_pixel_area {
                        (min * ctx.meters_per_pixel_area, max * ctx.meters_per_pixel_area)
                    } else {
                        (*min, *max)
                    };
                    x >= lo && x < hi
                }
                None => false,
            },
            Filter::All(children) => children.iter().all(|c| c.eval(props, ctx, engine)),
            Filter::Any(children) => children.iter().any(|c| c.eval(props, ctx, engine)),
            Filter::None(children) => !children.iter().any(|c| c.eval(props, ctx, engine)),
            Filter::Function(idx) => engine.eval_filter(*idx),
        }
    }
}

fn lookup(key: &str, props: &Properties, ctx: &StyleContext) -> Option<Value> {
    ctx.resolve_keyword(key).or_else(|| props.get(key).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::engine::NullEngine;
    use crate::geometry::GeometryType;

    fn ctx() -> StyleContext {
        StyleContext::new(10.0, GeometryType::Lines, 1.0)
    }

    #[test]
    fn equality_set_matches_geometry_keyword() {
        let filter = Filter::EqualitySet("$geometry".into(), vec![Value::Number(2.0)]);
        let mut engine = NullEngine;
        assert!(filter.eval(&Properties::new(), &ctx(), &mut engine));

        let point_ctx = StyleContext::new(10.0, GeometryType::Points, 1.0);
        assert!(!filter.eval(&Properties::new(), &point_ctx, &mut engine));
    }

    #[test]
    fn range_is_half_open_inclusive_lower_exclusive_upper() {
        let mut props = Properties::new();
        props.set("height", Value::Number(10.0));
        let mut engine = NullEngine;

        let lower_inclusive = Filter::Range("height".into(), 10.0, 20.0, false);
        assert!(lower_inclusive.eval(&props, &ctx(), &mut engine));

        let upper_exclusive = Filter::Range("height".into(), 0.0, 10.0, false);
        assert!(!upper_exclusive.eval(&props, &ctx(), &mut engine));
    }

    #[test]
    fn sort_prefers_cheap_keyword_filters_and_zoom_over_geometry() {
        let mut filter = Filter::All(vec![
            Filter::Function(JsFunctionIndex(0)),
            Filter::Equality("class".into(), Value::from("road")),
            Filter::EqualitySet("$geometry".into(), vec![Value::Number(2.0)]),
            Filter::EqualitySet("$zoom".into(), vec![Value::Number(10.0)]),
        ]);
        filter.sort();
        if let Filter::All(children) = &filter {
            assert_eq!(children[0].key(), Some("$zoom"));
            assert_eq!(children[1].key(), Some("$geometry"));
            assert_eq!(children[2].key(), Some("class"));
            assert!(matches!(children[3], Filter::Function(_)));
        } else {
            unreachable!();
        }
    }
}
