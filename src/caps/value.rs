//! Field values inside a caps structure.

use std::fmt;

/// A rational number, used for framerates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fraction {
    /// Numerator.
    pub num: i32,
    /// Denominator.
    pub den: i32,
}

impl Fraction {
    /// Create a fraction.
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    fn same_value(&self, other: &Self) -> bool {
        (self.num as i64) * (other.den as i64) == (other.num as i64) * (self.den as i64)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// A caps field value.
///
/// Scalars are fixed; lists and ranges describe a set of acceptable values and
/// are narrowed by [`Value::intersect`] and reduced to a scalar by
/// [`Value::fixate`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Integer.
    Int(i64),
    /// Boolean.
    Bool(bool),
    /// String.
    Str(String),
    /// Fraction.
    Fraction(Fraction),
    /// Inclusive integer range.
    IntRange {
        /// Minimum.
        min: i64,
        /// Maximum.
        max: i64,
    },
    /// Set of alternatives, ordered by preference.
    List(Vec<Value>),
}

impl Value {
    /// Whether this value is a single scalar.
    pub fn is_fixed(&self) -> bool {
        !matches!(self, Self::IntRange { .. } | Self::List(_))
    }

    /// Type annotation used when serializing (`int`, `string`, ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) | Self::IntRange { .. } => "int",
            Self::Bool(_) => "boolean",
            Self::Str(_) => "string",
            Self::Fraction(_) => "fraction",
            Self::List(items) => items.first().map_or("list", Value::type_name),
        }
    }

    /// Intersect two values.
    ///
    /// Returns `None` when no value satisfies both sides. A range that narrows
    /// to a single point and a list with a single survivor become scalars.
    pub fn intersect(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Self::List(items), other) => collapse(
                items
                    .iter()
                    .filter_map(|item| item.intersect(other))
                    .collect(),
            ),
            (this, Self::List(items)) => collapse(
                items
                    .iter()
                    .filter_map(|item| this.intersect(item))
                    .collect(),
            ),

            (Self::IntRange { min: a, max: b }, Self::IntRange { min: c, max: d }) => {
                let min = *a.max(c);
                let max = *b.min(d);
                match min.cmp(&max) {
                    std::cmp::Ordering::Less => Some(Self::IntRange { min, max }),
                    std::cmp::Ordering::Equal => Some(Self::Int(min)),
                    std::cmp::Ordering::Greater => None,
                }
            }
            (Self::Int(v), Self::IntRange { min, max })
            | (Self::IntRange { min, max }, Self::Int(v)) => {
                (*min..=*max).contains(v).then_some(Self::Int(*v))
            }

            (Self::Fraction(a), Self::Fraction(b)) => a.same_value(b).then_some(self.clone()),
            (a, b) => (a == b).then(|| a.clone()),
        }
    }

    /// Reduce to a scalar: ranges pick their minimum, lists their first entry.
    pub fn fixate(&self) -> Value {
        match self {
            Self::IntRange { min, .. } => Self::Int(*min),
            Self::List(items) => items.first().map_or_else(|| self.clone(), Value::fixate),
            other => other.clone(),
        }
    }

    /// The integer, if this is an [`Value::Int`].
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The string, if this is a [`Value::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

fn collapse(mut items: Vec<Value>) -> Option<Value> {
    match items.len() {
        0 => None,
        1 => items.pop(),
        _ => Some(Value::List(items)),
    }
}

/// Human-readable form: scalars bare, lists as `{ (string)a, (string)b }`,
/// ranges as `[ lo, hi ]`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Fraction(fr) => write!(f, "{fr}"),
            Self::IntRange { min, max } => write!(f, "[ {min}, {max} ]"),
            Self::List(items) => {
                f.write_str("{ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "({}){item}", item.type_name())?;
                }
                f.write_str(" }")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Fraction> for Value {
    fn from(v: Fraction) -> Self {
        Self::Fraction(v)
    }
}

impl From<std::ops::RangeInclusive<i64>> for Value {
    fn from(range: std::ops::RangeInclusive<i64>) -> Self {
        let (min, max) = range.into_inner();
        Self::IntRange { min, max }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_overlap() {
        let a = Value::from(1..=100);
        let b = Value::from(50..=200);
        assert_eq!(a.intersect(&b), Some(Value::IntRange { min: 50, max: 100 }));
        assert_eq!(
            Value::from(1..=50).intersect(&Value::from(50..=60)),
            Some(Value::Int(50))
        );
        assert_eq!(Value::from(1..=10).intersect(&Value::from(11..=20)), None);
    }

    #[test]
    fn test_scalar_against_range_and_list() {
        assert_eq!(
            Value::Int(44_100).intersect(&Value::from(1..=i32::MAX as i64)),
            Some(Value::Int(44_100))
        );
        assert_eq!(Value::Int(0).intersect(&Value::from(1..=2)), None);

        let formats = Value::from(vec!["S16LE", "F32LE"]);
        assert_eq!(
            formats.intersect(&Value::from("F32LE")),
            Some(Value::from("F32LE"))
        );
        assert_eq!(formats.intersect(&Value::from("U8")), None);
    }

    #[test]
    fn test_list_against_range_keeps_order() {
        let rates = Value::from(vec![48_000i64, 8_000, 44_100]);
        assert_eq!(
            rates.intersect(&Value::from(8_000..=44_100)),
            Some(Value::List(vec![Value::Int(8_000), Value::Int(44_100)]))
        );
    }

    #[test]
    fn test_mismatched_types_do_not_intersect() {
        assert_eq!(Value::Int(1).intersect(&Value::from("1")), None);
        assert_eq!(
            Value::Fraction(Fraction::new(30, 1)).intersect(&Value::Fraction(Fraction::new(60, 2))),
            Some(Value::Fraction(Fraction::new(30, 1)))
        );
    }

    #[test]
    fn test_fixate() {
        assert_eq!(Value::from(50..=100).fixate(), Value::Int(50));
        assert_eq!(Value::from(vec!["a", "b"]).fixate(), Value::from("a"));
        assert!(Value::from(1..=2).fixate().is_fixed());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("S16LE").to_string(), "S16LE");
        assert_eq!(Value::from(1..=100).to_string(), "[ 1, 100 ]");
        assert_eq!(
            Value::from(vec!["S16LE", "F32LE"]).to_string(),
            "{ (string)S16LE, (string)F32LE }"
        );
        assert_eq!(Value::Fraction(Fraction::new(30, 1)).to_string(), "30/1");
    }
}
