//! The expression AST and its evaluator.\
//! Expressions form a closed variant; evaluation is a match over kinds and
//! never panics, all failures are reported as `Err` to the caller.

use std::collections::HashMap;

use crate::datamodel::{
    data_to_boolean, data_to_string, numeric_to_integer, operation_and, operation_divide,
    operation_equal, operation_greater, operation_greater_equal, operation_less,
    operation_less_equal, operation_minus, operation_modulus, operation_multiply,
    operation_not_equal, operation_or, operation_plus, Data,
};
use crate::expression_engine::lexer::Operator;
use crate::fsm::GlobalData;

pub type ExpressionResult = Result<Data, String>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Data),
    Variable(String),
    Array(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary(Operator, Box<Expr>, Box<Expr>),
    Assign(Box<Expr>, Box<Expr>),
    AssignUndefined(Box<Expr>, Box<Expr>),
    Sequence(Vec<Expr>),
}

/// One step of a resolved assignment target.
enum PathSeg {
    Member(String),
    Index(Data),
}

impl Expr {
    pub fn execute(&self, global: &mut GlobalData) -> ExpressionResult {
        match self {
            Expr::Constant(data) => Ok(data.clone()),
            Expr::Variable(name) => match global.data.get(name) {
                Some(value) => Ok(value.clone()),
                None => Err(format!("Variable '{}' not found", name)),
            },
            Expr::Array(items) => {
                let mut v = Vec::with_capacity(items.len());
                for item in items {
                    v.push(item.execute(global)?);
                }
                Ok(Data::Array(v))
            }
            Expr::Map(members) => {
                let mut m = HashMap::with_capacity(members.len());
                for (key, value) in members {
                    let key_data = key.execute(global)?;
                    m.insert(data_to_string(&key_data), value.execute(global)?);
                }
                Ok(Data::Map(m))
            }
            Expr::Member(left, member) => {
                let left_value = left.execute(global)?;
                match left_value {
                    Data::Map(mut m) => match m.remove(member) {
                        Some(value) => Ok(value),
                        None => Err(format!("Member '{}' not found", member)),
                    },
                    other => Err(format!("Value '{}' has no members", other)),
                }
            }
            Expr::Index(left, index) => {
                let left_value = left.execute(global)?;
                let index_value = index.execute(global)?;
                match left_value {
                    Data::Array(mut a) => match numeric_to_integer(&index_value) {
                        Some(idx) if idx >= 0 && (idx as usize) < a.len() => {
                            Ok(a.swap_remove(idx as usize))
                        }
                        Some(idx) => Err(format!("Index {} out of range (len={})", idx, a.len())),
                        None => Err(format!("Illegal index '{}'", index_value)),
                    },
                    Data::Map(mut m) => {
                        let key = data_to_string(&index_value);
                        match m.remove(&key) {
                            Some(value) => Ok(value),
                            None => Err(format!("Member '{}' not found", key)),
                        }
                    }
                    other => Err(format!("Can't apply index on value '{}'", other)),
                }
            }
            Expr::Call(method, arguments) => {
                let mut args = Vec::with_capacity(arguments.len());
                for a in arguments {
                    args.push(a.execute(global)?);
                }
                let action = global.actions.get(method);
                match action {
                    None => Err(format!("Unknown function '{}'", method)),
                    Some(action) => action.execute(args.as_slice(), global),
                }
            }
            Expr::Not(right) => match right.execute(global)? {
                Data::Boolean(b) => Ok(Data::Boolean(!b)),
                _ => Err("'!' can only be applied on boolean expressions.".to_string()),
            },
            Expr::Negate(right) => match right.execute(global)? {
                Data::Integer(i) => Ok(Data::Integer(-i)),
                Data::Double(d) => Ok(Data::Double(-d)),
                other => Err(format!("Can't negate '{}'", other)),
            },
            Expr::Binary(op, left, right) => {
                // Boolean operators short-circuit, everything else is strict.
                match op {
                    Operator::And => {
                        let lv = left.execute(global)?;
                        if !data_to_boolean(&lv) {
                            return operation_and(&lv, &Data::Boolean(false));
                        }
                        operation_and(&lv, &right.execute(global)?)
                    }
                    Operator::Or => {
                        let lv = left.execute(global)?;
                        if data_to_boolean(&lv) {
                            return operation_or(&lv, &Data::Boolean(false));
                        }
                        operation_or(&lv, &right.execute(global)?)
                    }
                    _ => {
                        let lv = left.execute(global)?;
                        let rv = right.execute(global)?;
                        operation(op, &lv, &rv)
                    }
                }
            }
            Expr::Assign(left, right) => {
                let value = right.execute(global)?;
                assign_value(global, left, value.clone(), false)?;
                Ok(value)
            }
            Expr::AssignUndefined(left, right) => {
                let value = right.execute(global)?;
                assign_value(global, left, value.clone(), true)?;
                Ok(value)
            }
            Expr::Sequence(expressions) => {
                let mut r = Ok(Data::None());
                for e in expressions {
                    r = e.execute(global);
                    r.as_ref().map_err(|e| e.clone())?;
                }
                r
            }
        }
    }

    /// True for expressions that denote a data-model location.
    pub fn is_assignable(&self) -> bool {
        matches!(self, Expr::Variable(_) | Expr::Member(_, _) | Expr::Index(_, _))
    }
}

fn operation(op: &Operator, left: &Data, right: &Data) -> ExpressionResult {
    match op {
        Operator::Multiply => operation_multiply(left, right),
        Operator::Divide => operation_divide(left, right),
        Operator::Modulus => operation_modulus(left, right),
        Operator::Plus => operation_plus(left, right),
        Operator::Minus => operation_minus(left, right),
        Operator::Less => operation_less(left, right),
        Operator::LessEqual => operation_less_equal(left, right),
        Operator::Greater => operation_greater(left, right),
        Operator::GreaterEqual => operation_greater_equal(left, right),
        Operator::Equal => operation_equal(left, right),
        Operator::NotEqual => operation_not_equal(left, right),
        Operator::And => operation_and(left, right),
        Operator::Or => operation_or(left, right),
        Operator::Not | Operator::Assign | Operator::AssignUndefined => {
            // Handled by explicit Expr variants, never reached via Binary.
            Err("Internal Error".to_string())
        }
    }
}

/// Resolves the assignment target to the root variable and the path inside
/// its value. Index expressions are evaluated here, before the data store is
/// borrowed for writing.
fn lvalue_path(expr: &Expr, global: &mut GlobalData) -> Result<(String, Vec<PathSeg>), String> {
    match expr {
        Expr::Variable(name) => Ok((name.clone(), Vec::new())),
        Expr::Member(left, member) => {
            let (root, mut segs) = lvalue_path(left, global)?;
            segs.push(PathSeg::Member(member.clone()));
            Ok((root, segs))
        }
        Expr::Index(left, index) => {
            let (root, mut segs) = lvalue_path(left, global)?;
            let index_value = index.execute(global)?;
            segs.push(PathSeg::Index(index_value));
            Ok((root, segs))
        }
        _ => Err("Can't assign to that".to_string()),
    }
}

fn navigate<'a>(mut data: &'a mut Data, segs: &[PathSeg]) -> Result<&'a mut Data, String> {
    for seg in segs {
        data = match seg {
            PathSeg::Member(name) => match data {
                Data::Map(m) => m.entry(name.clone()).or_insert(Data::None()),
                other => return Err(format!("Value '{}' has no members", other)),
            },
            PathSeg::Index(index) => match data {
                Data::Array(a) => {
                    let len = a.len();
                    match numeric_to_integer(index) {
                        Some(idx) if idx >= 0 && (idx as usize) < len => &mut a[idx as usize],
                        Some(idx) => {
                            return Err(format!("Index {} out of range (len={})", idx, len));
                        }
                        None => return Err(format!("Illegal index '{}'", index)),
                    }
                }
                Data::Map(m) => m.entry(data_to_string(index)).or_insert(Data::None()),
                other => return Err(format!("Can't apply index on value '{}'", other)),
            },
        };
    }
    Ok(data)
}

/// Writes `value` to the location denoted by `lhs`.\
/// With `allow_undefined` an unknown root variable is declared on the fly,
/// otherwise it is an error. Read-only variables reject the write.
pub fn assign_value(
    global: &mut GlobalData,
    lhs: &Expr,
    value: Data,
    allow_undefined: bool,
) -> Result<(), String> {
    let (root, segs) = lvalue_path(lhs, global)?;
    if global.data.is_read_only(&root) {
        return Err(format!("Variable '{}' is read-only", root));
    }
    if segs.is_empty() {
        if global.data.contains(&root) || allow_undefined {
            global.data.set(&root, value);
            Ok(())
        } else {
            Err(format!("Variable '{}' not found", root))
        }
    } else {
        match global.data.get_mut(&root) {
            None => Err(format!("Variable '{}' not found", root)),
            Some(slot) => {
                let target = navigate(slot, segs.as_slice())?;
                *target = value;
                Ok(())
            }
        }
    }
}
