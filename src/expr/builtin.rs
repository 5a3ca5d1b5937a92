//! Reserved function names callable from rule expressions (spec §6).
//!
//! Mirrors the teacher's `BuiltinFunc`/`ArithOp` enums: one variant per
//! function, each documented with its signature, plus `parse`/`arity`/
//! `as_str` so the (external) expression parser and the DAG builder agree
//! on arity without duplicating the function table.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFn {
    /// regexpMatch(pattern, value) -> Bool
    RegexpMatch,
    /// containsAny(value, p1, ..., pn) -> Bool
    ContainsAny,
    /// abs(x) -> numeric
    Abs,
    /// ceil(x) -> Int
    Ceil,
    /// floor(x) -> Int
    Floor,
    /// round(x, digits?) -> Float
    Round,
    /// pow(base, exp) -> Float
    Pow,
    /// length(x) -> Int, for String or List
    Length,
    /// now() -> Time
    Now,
    /// date(string) -> Time
    Date,
    /// days(n) -> Int nanoseconds
    Days,
    /// hours(n) -> Int nanoseconds
    Hours,
    /// minutes(n) -> Int nanoseconds
    Minutes,
    /// seconds(n) -> Int nanoseconds
    Seconds,
    /// min(a, b, ...) -> numeric, variadic over scalars
    Min,
    /// max(a, b, ...) -> numeric, variadic over scalars
    Max,
}

impl BuiltinFn {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "regexpMatch" => BuiltinFn::RegexpMatch,
            "containsAny" => BuiltinFn::ContainsAny,
            "abs" => BuiltinFn::Abs,
            "ceil" => BuiltinFn::Ceil,
            "floor" => BuiltinFn::Floor,
            "round" => BuiltinFn::Round,
            "pow" => BuiltinFn::Pow,
            "length" => BuiltinFn::Length,
            "now" => BuiltinFn::Now,
            "date" => BuiltinFn::Date,
            "days" => BuiltinFn::Days,
            "hours" => BuiltinFn::Hours,
            "minutes" => BuiltinFn::Minutes,
            "seconds" => BuiltinFn::Seconds,
            "min" => BuiltinFn::Min,
            "max" => BuiltinFn::Max,
            _ => return None,
        })
    }

    /// Fixed arity, or `None` for variadic functions.
    #[must_use]
    pub fn arity(&self) -> Option<usize> {
        match self {
            BuiltinFn::RegexpMatch => Some(2),
            BuiltinFn::ContainsAny => None,
            BuiltinFn::Abs | BuiltinFn::Ceil | BuiltinFn::Floor => Some(1),
            BuiltinFn::Round => None, // 1 or 2
            BuiltinFn::Pow => Some(2),
            BuiltinFn::Length => Some(1),
            BuiltinFn::Now => Some(0),
            BuiltinFn::Date => Some(1),
            BuiltinFn::Days | BuiltinFn::Hours | BuiltinFn::Minutes | BuiltinFn::Seconds => {
                Some(1)
            }
            BuiltinFn::Min | BuiltinFn::Max => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinFn::RegexpMatch => "regexpMatch",
            BuiltinFn::ContainsAny => "containsAny",
            BuiltinFn::Abs => "abs",
            BuiltinFn::Ceil => "ceil",
            BuiltinFn::Floor => "floor",
            BuiltinFn::Round => "round",
            BuiltinFn::Pow => "pow",
            BuiltinFn::Length => "length",
            BuiltinFn::Now => "now",
            BuiltinFn::Date => "date",
            BuiltinFn::Days => "days",
            BuiltinFn::Hours => "hours",
            BuiltinFn::Minutes => "minutes",
            BuiltinFn::Seconds => "seconds",
            BuiltinFn::Min => "min",
            BuiltinFn::Max => "max",
        }
    }

    /// True for functions whose result directly feeds a predicate (rather
    /// than an intermediate numeric/string value).
    #[must_use]
    pub fn is_predicate(&self) -> bool {
        matches!(self, BuiltinFn::RegexpMatch | BuiltinFn::ContainsAny)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_with_as_str() {
        for name in ["regexpMatch", "abs", "min", "days"] {
            let f = BuiltinFn::parse(name).unwrap();
            assert_eq!(f.as_str(), name);
        }
    }

    #[test]
    fn unknown_function_name_is_none() {
        assert!(BuiltinFn::parse("not_a_real_fn").is_none());
    }

    #[test]
    fn fixed_arity_functions_report_arity() {
        assert_eq!(BuiltinFn::RegexpMatch.arity(), Some(2));
        assert_eq!(BuiltinFn::ContainsAny.arity(), None);
    }
}
