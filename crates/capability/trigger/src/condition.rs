//! 条件求值（按类型比较）。

use domain::{CompareValue, Condition, Operator, TagData};
use std::cmp::Ordering;

/// 求值条件；类型不匹配时返回错误描述。
///
/// `changed` / `rising` / `falling` 与上一次观测值比较，首次观测只建立基线。
pub(crate) fn evaluate(
    condition: &Condition,
    current: &TagData,
    previous: Option<&TagData>,
) -> Result<bool, String> {
    let operator = condition.operator;
    match operator {
        Operator::Changed => Ok(previous.is_some_and(|prev| !prev.same_value(current))),
        Operator::Rising | Operator::Falling => {
            let Some(prev) = previous else {
                return Ok(false);
            };
            let now = numeric(current, operator)?;
            let before = numeric(prev, operator)?;
            let wanted = if operator == Operator::Rising {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            Ok(now.order(before) == Some(wanted))
        }
        _ => {
            let target = condition
                .value
                .as_ref()
                .ok_or_else(|| format!("operator {} requires a comparison value", operator))?;
            compare(operator, current, target)
        }
    }
}

/// 公共数值类型：两侧都是整数（含 bool）时按 i64 比较，否则按 f64。
#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &TagData) -> Option<Self> {
        match value {
            TagData::Bool(v) => Some(Number::Int(i64::from(*v))),
            TagData::Int(v) => Some(Number::Int(*v)),
            TagData::Float(v) => Some(Number::Float(*v)),
            TagData::String(_) | TagData::Bytes(_) => None,
        }
    }

    fn of_target(value: &CompareValue) -> Option<Self> {
        match value {
            CompareValue::Bool(v) => Some(Number::Int(i64::from(*v))),
            CompareValue::Int(v) => Some(Number::Int(*v)),
            CompareValue::Float(v) => Some(Number::Float(*v)),
            CompareValue::String(_) => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }

    /// NaN 参与时无序。
    fn order(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

fn numeric(value: &TagData, operator: Operator) -> Result<Number, String> {
    Number::of(value).ok_or_else(|| {
        format!(
            "operator {} needs a numeric value, got {}",
            operator,
            value.type_name()
        )
    })
}

fn compare(operator: Operator, current: &TagData, target: &CompareValue) -> Result<bool, String> {
    match (current, target) {
        (TagData::String(a), CompareValue::String(b)) => match operator {
            Operator::Eq => Ok(a == b),
            Operator::Ne => Ok(a != b),
            _ => Err(format!("operator {} is not defined for strings", operator)),
        },
        (TagData::String(_), _) | (TagData::Bytes(_), _) | (_, CompareValue::String(_)) => {
            Err(format!(
                "cannot compare {} value with {}",
                current.type_name(),
                compare_type(target)
            ))
        }
        _ => {
            let a = numeric(current, operator)?;
            let b = Number::of_target(target).ok_or_else(|| "string comparison value".to_string())?;
            let order = a.order(b);
            match operator {
                Operator::Eq => Ok(order == Some(Ordering::Equal)),
                Operator::Ne => Ok(order != Some(Ordering::Equal)),
                Operator::Gt => Ok(order == Some(Ordering::Greater)),
                Operator::Lt => Ok(order == Some(Ordering::Less)),
                Operator::Gte => Ok(matches!(order, Some(Ordering::Greater | Ordering::Equal))),
                Operator::Lte => Ok(matches!(order, Some(Ordering::Less | Ordering::Equal))),
                Operator::Changed | Operator::Rising | Operator::Falling => {
                    Err(format!("operator {} does not take a comparison value", operator))
                }
            }
        }
    }
}

fn compare_type(value: &CompareValue) -> &'static str {
    match value {
        CompareValue::Bool(_) => "bool",
        CompareValue::Int(_) => "int",
        CompareValue::Float(_) => "float",
        CompareValue::String(_) => "string",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(operator: Operator, value: Option<CompareValue>) -> Condition {
        Condition::new(operator, value)
    }

    #[test]
    fn numeric_operators_coerce_types() {
        let gt = cond(Operator::Gt, Some(CompareValue::Float(2.5)));
        assert_eq!(evaluate(&gt, &TagData::Int(3), None), Ok(true));
        assert_eq!(evaluate(&gt, &TagData::Float(2.5), None), Ok(false));

        let eq_bool = cond(Operator::Eq, Some(CompareValue::Int(1)));
        assert_eq!(evaluate(&eq_bool, &TagData::Bool(true), None), Ok(true));

        let lte = cond(Operator::Lte, Some(CompareValue::Bool(false)));
        assert_eq!(evaluate(&lte, &TagData::Int(0), None), Ok(true));
    }

    #[test]
    fn large_integers_compare_exactly() {
        let big = 9_007_199_254_740_993_i64;
        let eq = cond(Operator::Eq, Some(CompareValue::Int(big)));
        assert_eq!(evaluate(&eq, &TagData::Int(big - 1), None), Ok(false));
        assert_eq!(evaluate(&eq, &TagData::Int(big), None), Ok(true));

        let gt = cond(Operator::Gt, Some(CompareValue::Int(big - 1)));
        assert_eq!(evaluate(&gt, &TagData::Int(big), None), Ok(true));

        let rising = cond(Operator::Rising, None);
        assert_eq!(
            evaluate(&rising, &TagData::Int(big), Some(&TagData::Int(big - 1))),
            Ok(true)
        );

        let nan = cond(Operator::Ne, Some(CompareValue::Float(1.0)));
        assert_eq!(evaluate(&nan, &TagData::Float(f64::NAN), None), Ok(true));
    }

    #[test]
    fn strings_support_equality_only() {
        let eq = cond(Operator::Eq, Some(CompareValue::String("RUN".to_string())));
        assert_eq!(evaluate(&eq, &TagData::String("RUN".to_string()), None), Ok(true));

        let ne = cond(Operator::Ne, Some(CompareValue::String("RUN".to_string())));
        assert_eq!(evaluate(&ne, &TagData::String("STOP".to_string()), None), Ok(true));

        let gt = cond(Operator::Gt, Some(CompareValue::String("A".to_string())));
        assert!(evaluate(&gt, &TagData::String("B".to_string()), None).is_err());

        let mixed = cond(Operator::Eq, Some(CompareValue::Int(1)));
        assert!(evaluate(&mixed, &TagData::String("1".to_string()), None).is_err());
    }

    #[test]
    fn edge_operators_need_a_baseline() {
        let changed = cond(Operator::Changed, None);
        assert_eq!(evaluate(&changed, &TagData::Int(1), None), Ok(false));
        assert_eq!(
            evaluate(&changed, &TagData::Int(1), Some(&TagData::Int(0))),
            Ok(true)
        );
        assert_eq!(
            evaluate(&changed, &TagData::Int(1), Some(&TagData::Int(1))),
            Ok(false)
        );

        let rising = cond(Operator::Rising, None);
        assert_eq!(
            evaluate(&rising, &TagData::Float(1.5), Some(&TagData::Float(1.0))),
            Ok(true)
        );
        let falling = cond(Operator::Falling, None);
        assert_eq!(
            evaluate(&falling, &TagData::Float(1.5), Some(&TagData::Float(1.0))),
            Ok(false)
        );
        assert!(
            evaluate(
                &rising,
                &TagData::String("b".to_string()),
                Some(&TagData::String("a".to_string()))
            )
            .is_err()
        );
    }
}
