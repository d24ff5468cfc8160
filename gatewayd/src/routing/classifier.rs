//! Routing classifier: keyword / regex / condition rule matching.
//!
//! The condition grammar is a small hand-rolled recursive-descent
//! evaluator - booleans, comparisons, and a fixed set of accessors only,
//! deliberately never an `eval` over arbitrary expressions.

use regex::Regex;

use crate::db::handlers::routing_rule::RoutingRules;
use crate::db::models::routing_rule::RoutingRuleDBResponse;
use crate::routing::{Decision, RequestFeatures};
use crate::types::{DecisionSource, RoutingRuleId, TaskType};

/// Result of running the classifier against one request: the first
/// (highest-priority) matching rule is authoritative, but every rule that
/// *would* have matched is recorded for observability.
pub struct ClassifierResult {
    pub matched: Option<RoutingRuleDBResponse>,
    pub all_matches: Vec<RoutingRuleId>,
}

/// Evaluate enabled rules, already ordered `priority DESC, id` by
/// [`RoutingRules::list_enabled_ordered`] (which also gives the id-order
/// tie-break among same-priority rules).
pub async fn classify(conn: &mut sqlx::PgConnection, features: &RequestFeatures) -> crate::db::errors::Result<ClassifierResult> {
    let rules = RoutingRules::new(conn).list_enabled_ordered().await?;
    let mut matched = None;
    let mut all_matches = Vec::new();

    for rule in rules {
        if rule_matches(&rule, features) {
            all_matches.push(rule.id);
            if matched.is_none() {
                matched = Some(rule);
            }
        }
    }

    Ok(ClassifierResult { matched, all_matches })
}

fn rule_matches(rule: &RoutingRuleDBResponse, features: &RequestFeatures) -> bool {
    let normalised_message = features.last_user_message.to_lowercase();

    if !rule.keywords.is_empty() {
        let any_keyword = rule.keywords.iter().any(|kw| normalised_message.contains(&kw.to_lowercase()));
        if !any_keyword {
            return false;
        }
    }

    if let Some(pattern) = &rule.regex {
        match Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(&features.last_user_message) {
                    return false;
                }
            }
            Err(_) => return false,
        }
    }

    if let Some(condition) = &rule.condition {
        match eval_condition(condition, features) {
            Ok(result) => {
                if !result {
                    return false;
                }
            }
            Err(_) => return false,
        }
    }

    // A rule with no sub-clauses at all never matches: it would otherwise
    // fire on every request.
    !rule.keywords.is_empty() || rule.regex.is_some() || rule.condition.is_some()
}

pub fn matched_rule_to_decision(result: &ClassifierResult, default_role: TaskType) -> Decision {
    match &result.matched {
        Some(rule) => Decision {
            task_type: rule.task_type,
            reason: format!("matched rule '{}'", rule.name),
            source: DecisionSource::Rule,
            matched_rule_id: Some(rule.id),
            matched_rule_name: Some(rule.name.clone()),
            model_used: None,
            from_cache: false,
            latency_ms: 0,
            all_matches: result.all_matches.clone(),
        },
        None => Decision {
            task_type: default_role,
            reason: "no routing rule matched".to_string(),
            source: DecisionSource::Default,
            matched_rule_id: None,
            matched_rule_name: None,
            model_used: None,
            from_cache: false,
            latency_ms: 0,
            all_matches: result.all_matches.clone(),
        },
    }
}

// --- Condition grammar -----------------------------------------------------
//
// expr       := or_expr
// or_expr    := and_expr ( '||' and_expr )*
// and_expr   := unary ( '&&' unary )*
// unary      := '!' unary | comparison
// comparison := term ( ('==' | '!=' | '>=' | '<=' | '>' | '<') term )?
// term       := number | string | 'true' | 'false' | accessor | '(' expr ')'
// accessor   := ident ( '(' arg? ')' )?

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bool(bool),
    Num(f64),
    Str(String),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    And,
    Or,
    Not,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, anyhow::Error> {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != quote {
                    j += 1;
                }
                if j >= chars.len() {
                    anyhow::bail!("unterminated string literal in condition");
                }
                tokens.push(Token::Str(chars[start..j].iter().collect()));
                i = j + 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut j = i;
                while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                    j += 1;
                }
                let s: String = chars[start..j].iter().collect();
                let n: f64 = s.parse().map_err(|_| anyhow::anyhow!("invalid number literal '{s}'"))?;
                tokens.push(Token::Number(n));
                i = j;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                let mut j = i;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                tokens.push(Token::Ident(chars[start..j].iter().collect()));
                i = j;
            }
            other => anyhow::bail!("unexpected character '{other}' in condition"),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    features: &'a RequestFeatures,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn expect(&mut self, token: &Token) -> Result<(), anyhow::Error> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            other => anyhow::bail!("expected {:?}, found {:?}", token, other),
        }
    }

    fn parse_expr(&mut self) -> Result<Value, anyhow::Error> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Value, anyhow::Error> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.next();
            let right = self.parse_and()?;
            left = Value::Bool(left.truthy() || right.truthy());
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value, anyhow::Error> {
        let mut left = self.parse_unary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.next();
            let right = self.parse_unary()?;
            left = Value::Bool(left.truthy() && right.truthy());
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Value, anyhow::Error> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.next();
            let v = self.parse_unary()?;
            return Ok(Value::Bool(!v.truthy()));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Value, anyhow::Error> {
        let left = self.parse_term()?;
        let op = match self.peek() {
            Some(Token::Eq) => Token::Eq,
            Some(Token::Ne) => Token::Ne,
            Some(Token::Gt) => Token::Gt,
            Some(Token::Lt) => Token::Lt,
            Some(Token::Ge) => Token::Ge,
            Some(Token::Le) => Token::Le,
            _ => return Ok(left),
        };
        self.next();
        let right = self.parse_term()?;
        Ok(Value::Bool(compare(&op, &left, &right)))
    }

    fn parse_term(&mut self) -> Result<Value, anyhow::Error> {
        match self.next().cloned() {
            Some(Token::Number(n)) => Ok(Value::Num(n)),
            Some(Token::Str(s)) => Ok(Value::Str(s)),
            Some(Token::LParen) => {
                let v = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(v)
            }
            Some(Token::Ident(name)) => self.parse_accessor(name),
            other => anyhow::bail!("unexpected token {:?} in condition", other),
        }
    }

    fn parse_accessor(&mut self, name: String) -> Result<Value, anyhow::Error> {
        match name.as_str() {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            "has_tool" => return Ok(Value::Bool(self.features.has_tool)),
            "has_image" => return Ok(Value::Bool(self.features.has_image)),
            "model" => return Ok(Value::Str(self.features.model.clone())),
            _ => {}
        }

        if matches!(self.peek(), Some(Token::LParen)) {
            self.next();
            let mut args = Vec::new();
            if !matches!(self.peek(), Some(Token::RParen)) {
                loop {
                    args.push(self.parse_expr()?);
                    if matches!(self.peek(), Some(Token::Comma)) {
                        self.next();
                        continue;
                    }
                    break;
                }
            }
            self.expect(&Token::RParen)?;
            return match name.as_str() {
                "len" => Ok(Value::Num(self.features.last_user_message.chars().count() as f64)),
                "system_contains" => {
                    let needle = match args.first() {
                        Some(Value::Str(s)) => s.to_lowercase(),
                        _ => anyhow::bail!("system_contains() requires a string argument"),
                    };
                    let system = self.features.system_prompt.as_deref().unwrap_or_default().to_lowercase();
                    Ok(Value::Bool(system.contains(&needle)))
                }
                other => anyhow::bail!("unknown accessor function '{other}'"),
            };
        }

        anyhow::bail!("unknown accessor '{name}'")
    }
}

fn compare(op: &Token, left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Num(a), Value::Num(b)) => match op {
            Token::Eq => a == b,
            Token::Ne => a != b,
            Token::Gt => a > b,
            Token::Lt => a < b,
            Token::Ge => a >= b,
            Token::Le => a <= b,
            _ => false,
        },
        (Value::Str(a), Value::Str(b)) => match op {
            Token::Eq => a == b,
            Token::Ne => a != b,
            _ => false,
        },
        (Value::Bool(a), Value::Bool(b)) => match op {
            Token::Eq => a == b,
            Token::Ne => a != b,
            _ => false,
        },
        _ => false,
    }
}

fn eval_condition(condition: &str, features: &RequestFeatures) -> Result<bool, anyhow::Error> {
    let tokens = tokenize(condition)?;
    let mut parser = Parser { tokens: &tokens, pos: 0, features };
    let value = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        anyhow::bail!("unexpected trailing tokens in condition");
    }
    Ok(value.truthy())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> RequestFeatures {
        RequestFeatures {
            last_user_message: "please summarise this".to_string(),
            system_prompt: Some("you are a careful assistant".to_string()),
            model: "claude-3-haiku".to_string(),
            has_tool: false,
            has_image: true,
        }
    }

    #[test]
    fn len_accessor_counts_characters_of_the_request_message() {
        assert!(eval_condition("len() > 5", &features()).unwrap());
        assert!(!eval_condition("len() > 100", &features()).unwrap());
    }

    #[test]
    fn has_image_accessor_reads_feature_flag() {
        assert!(eval_condition("has_image", &features()).unwrap());
        assert!(!eval_condition("has_tool", &features()).unwrap());
    }

    #[test]
    fn boolean_combinators_short_circuit_correctly() {
        assert!(eval_condition("has_image && !has_tool", &features()).unwrap());
        assert!(!eval_condition("has_tool || false", &features()).unwrap());
    }

    #[test]
    fn system_contains_is_case_insensitive() {
        assert!(eval_condition("system_contains(\"CAREFUL\")", &features()).unwrap());
        assert!(!eval_condition("system_contains(\"reckless\")", &features()).unwrap());
    }

    #[test]
    fn model_equality_comparison() {
        assert!(eval_condition("model == \"claude-3-haiku\"", &features()).unwrap());
        assert!(eval_condition("model != \"gpt-4\"", &features()).unwrap());
    }

    #[test]
    fn rejects_unknown_accessor() {
        assert!(eval_condition("nonexistent_thing", &features()).is_err());
    }
}
