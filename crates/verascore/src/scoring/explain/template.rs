//! Parser and evaluator for the explanation template language.
//!
//! The grammar is deliberately small: literal text, `{variable}` substitution,
//! `{{`/`}}` escapes, and nestable `{if expr}`/`{else}`/`{endif}` blocks. A
//! comparison's right-hand side is a number, a quoted string or another
//! variable; a `}` inside a quoted string does not close its tag. A template
//! is parsed once into a node tree and rendered any number of times.

use std::fmt;

use serde::{Serialize, Serializer};

/// Placeholder rendered for a variable with no value.
pub const UNAVAILABLE: &str = "data unavailable";

/// Contributor position within a factor's ranked components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Top,
    Second,
    /// Second-lowest contributor.
    Lower,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributorField {
    Label,
    Value,
    Score,
    Weight,
}

/// Every name a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    Factor,
    FactorId,
    Score,
    Assessment,
    MetricsAvailable,
    MetricsTotal,
    Contributor(Slot, ContributorField),
}

impl Variable {
    pub fn parse(name: &str) -> Option<Self> {
        let variable = match name {
            "factor" => Self::Factor,
            "factor_id" => Self::FactorId,
            "score" => Self::Score,
            "assessment" => Self::Assessment,
            "metrics_available" => Self::MetricsAvailable,
            "metrics_total" => Self::MetricsTotal,
            _ => {
                let (slot, field) = name.split_once('_')?;
                let slot = match slot {
                    "top" => Slot::Top,
                    "second" => Slot::Second,
                    "lower" => Slot::Lower,
                    "bottom" => Slot::Bottom,
                    _ => return None,
                };
                let field = match field {
                    "label" => ContributorField::Label,
                    "value" => ContributorField::Value,
                    "score" => ContributorField::Score,
                    "weight" => ContributorField::Weight,
                    _ => return None,
                };
                Self::Contributor(slot, field)
            }
        };
        Some(variable)
    }
}

/// A resolved variable: its rendered text and, when numeric, the number that
/// conditions compare against.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub text: String,
    pub number: Option<f64>,
}

impl Binding {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            number: None,
        }
    }

    pub fn number(text: impl Into<String>, number: f64) -> Self {
        Self {
            text: text.into(),
            number: Some(number),
        }
    }
}

/// Lookup of variable values at render time. `None` means the value is absent.
pub trait Bindings {
    fn lookup(&self, variable: Variable) -> Option<Binding>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unterminated tag starting at byte {offset}")]
    UnterminatedTag { offset: usize },
    #[error("empty tag at byte {offset}")]
    EmptyTag { offset: usize },
    #[error("unknown variable '{name}'")]
    UnknownVariable { name: String },
    #[error("{{else}} without a matching {{if}}")]
    UnexpectedElse,
    #[error("{{endif}} without a matching {{if}}")]
    UnexpectedEndif,
    #[error("{{if}} block is never closed")]
    UnclosedIf,
    #[error("invalid condition '{condition}': {reason}")]
    InvalidCondition { condition: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
    Ne,
}

impl CompareOp {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            ">=" => Some(Self::Ge),
            ">" => Some(Self::Gt),
            "<=" => Some(Self::Le),
            "<" => Some(Self::Lt),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    fn holds(self, left: f64, right: f64) -> bool {
        match self {
            Self::Ge => left >= right,
            Self::Gt => left > right,
            Self::Le => left <= right,
            Self::Lt => left < right,
            Self::Eq => left == right,
            Self::Ne => left != right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Literal(Literal),
    Variable(Variable),
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Present(Variable),
    Compare {
        variable: Variable,
        op: CompareOp,
        operand: Operand,
    },
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    fn evaluate(&self, bindings: &dyn Bindings) -> bool {
        match self {
            Condition::Present(variable) => bindings.lookup(*variable).is_some(),
            Condition::Compare {
                variable,
                op,
                operand,
            } => {
                let Some(left) = bindings.lookup(*variable) else {
                    return false;
                };
                match operand {
                    Operand::Literal(Literal::Number(right)) => {
                        left.number.is_some_and(|left| op.holds(left, *right))
                    }
                    Operand::Literal(Literal::Text(right)) => compare_text(*op, &left.text, right),
                    Operand::Variable(other) => {
                        let Some(right) = bindings.lookup(*other) else {
                            return false;
                        };
                        match (left.number, right.number) {
                            (Some(left), Some(right)) => op.holds(left, right),
                            _ => compare_text(*op, &left.text, &right.text),
                        }
                    }
                }
            }
            Condition::Not(inner) => !inner.evaluate(bindings),
            Condition::And(left, right) => left.evaluate(bindings) && right.evaluate(bindings),
            Condition::Or(left, right) => left.evaluate(bindings) || right.evaluate(bindings),
        }
    }
}

fn compare_text(op: CompareOp, left: &str, right: &str) -> bool {
    match op {
        CompareOp::Eq => left == right,
        CompareOp::Ne => left != right,
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Variable(Variable),
    Conditional {
        condition: Condition,
        then_branch: Vec<Node>,
        else_branch: Vec<Node>,
    },
}

/// A parsed explanation template.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplanationTemplate {
    source: String,
    nodes: Vec<Node>,
}

impl ExplanationTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let tokens = tokenize(source)?;
        let nodes = build_tree(tokens)?;
        Ok(Self {
            source: source.to_string(),
            nodes,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, bindings: &dyn Bindings) -> String {
        let mut out = String::with_capacity(self.source.len());
        render_nodes(&self.nodes, bindings, &mut out);
        out
    }
}

impl fmt::Display for ExplanationTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for ExplanationTemplate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

fn render_nodes(nodes: &[Node], bindings: &dyn Bindings, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Variable(variable) => match bindings.lookup(*variable) {
                Some(binding) => out.push_str(&binding.text),
                None => out.push_str(UNAVAILABLE),
            },
            Node::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let branch = if condition.evaluate(bindings) {
                    then_branch
                } else {
                    else_branch
                };
                render_nodes(branch, bindings, out);
            }
        }
    }
}

#[derive(Debug)]
enum Token {
    Text(String),
    Variable(Variable),
    If(Condition),
    Else,
    Endif,
}

fn tokenize(source: &str) -> Result<Vec<Token>, TemplateError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut cursor = 0;
    let mut literal_start = 0;

    while cursor < bytes.len() {
        match bytes[cursor] {
            b'{' if bytes.get(cursor + 1) == Some(&b'{') => {
                text.push_str(&source[literal_start..cursor]);
                text.push('{');
                cursor += 2;
                literal_start = cursor;
            }
            b'}' if bytes.get(cursor + 1) == Some(&b'}') => {
                text.push_str(&source[literal_start..cursor]);
                text.push('}');
                cursor += 2;
                literal_start = cursor;
            }
            b'{' => {
                text.push_str(&source[literal_start..cursor]);
                let open = cursor;
                let close = tag_end(source, open + 1)
                    .ok_or(TemplateError::UnterminatedTag { offset: open })?;
                let token = parse_tag(&source[open + 1..close], open)?;
                cursor = close + 1;

                let is_control = matches!(token, Token::If(_) | Token::Else | Token::Endif);
                if is_control && standalone(source, open, cursor) {
                    // A control tag alone on its line takes the whole line with it.
                    let keep = text.trim_end_matches([' ', '\t']).len();
                    text.truncate(keep);
                    cursor = line_end(source, cursor);
                }

                if !text.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut text)));
                }
                tokens.push(token);
                literal_start = cursor;
            }
            _ => cursor += 1,
        }
    }

    text.push_str(&source[literal_start..]);
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
    Ok(tokens)
}

/// Byte index of the `}` closing a tag whose content starts at `from`,
/// skipping over quoted strings.
fn tag_end(source: &str, from: usize) -> Option<usize> {
    let mut quote = None;
    for (index, ch) in source[from..].char_indices() {
        match (quote, ch) {
            (Some(open), _) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '}') => return Some(from + index),
            (None, _) => {}
        }
    }
    None
}

fn standalone(source: &str, open: usize, close: usize) -> bool {
    let line_start = source[..open].rfind('\n').map_or(0, |index| index + 1);
    let before = &source[line_start..open];
    let after_end = source[close..]
        .find('\n')
        .map_or(source.len(), |index| close + index);
    let after = &source[close..after_end];

    is_blank(before) && is_blank(after.trim_end_matches('\r'))
}

fn is_blank(segment: &str) -> bool {
    segment.chars().all(|ch| ch == ' ' || ch == '\t')
}

fn line_end(source: &str, from: usize) -> usize {
    source[from..]
        .find('\n')
        .map_or(source.len(), |index| from + index + 1)
}

fn parse_tag(content: &str, offset: usize) -> Result<Token, TemplateError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(TemplateError::EmptyTag { offset });
    }

    match content {
        "else" => return Ok(Token::Else),
        "endif" => return Ok(Token::Endif),
        _ => {}
    }

    if let Some(expression) = content.strip_prefix("if") {
        if expression.is_empty() || expression.starts_with(char::is_whitespace) {
            return parse_condition(expression.trim()).map(Token::If);
        }
    }

    Variable::parse(content)
        .map(Token::Variable)
        .ok_or_else(|| TemplateError::UnknownVariable {
            name: content.to_string(),
        })
}

fn build_tree(tokens: Vec<Token>) -> Result<Vec<Node>, TemplateError> {
    struct Frame {
        condition: Condition,
        then_branch: Vec<Node>,
        else_branch: Option<Vec<Node>>,
    }

    impl Frame {
        fn active(&mut self) -> &mut Vec<Node> {
            match &mut self.else_branch {
                Some(branch) => branch,
                None => &mut self.then_branch,
            }
        }
    }

    let mut root = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for token in tokens {
        let node = match token {
            Token::Text(text) => Node::Text(text),
            Token::Variable(variable) => Node::Variable(variable),
            Token::If(condition) => {
                stack.push(Frame {
                    condition,
                    then_branch: Vec::new(),
                    else_branch: None,
                });
                continue;
            }
            Token::Else => {
                match stack.last_mut() {
                    Some(frame) if frame.else_branch.is_none() => {
                        frame.else_branch = Some(Vec::new());
                    }
                    _ => return Err(TemplateError::UnexpectedElse),
                }
                continue;
            }
            Token::Endif => {
                let frame = stack.pop().ok_or(TemplateError::UnexpectedEndif)?;
                Node::Conditional {
                    condition: frame.condition,
                    then_branch: frame.then_branch,
                    else_branch: frame.else_branch.unwrap_or_default(),
                }
            }
        };

        match stack.last_mut() {
            Some(frame) => frame.active().push(node),
            None => root.push(node),
        }
    }

    if stack.is_empty() {
        Ok(root)
    } else {
        Err(TemplateError::UnclosedIf)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum CondToken {
    Word(String),
    Number(f64),
    Quoted(String),
    Op(CompareOp),
}

fn parse_condition(expression: &str) -> Result<Condition, TemplateError> {
    let invalid = |reason: &str| TemplateError::InvalidCondition {
        condition: expression.to_string(),
        reason: reason.to_string(),
    };

    if expression.is_empty() {
        return Err(invalid("missing expression"));
    }

    let tokens = lex_condition(expression).map_err(|reason| invalid(&reason))?;
    let mut parser = ConditionParser {
        tokens: &tokens,
        position: 0,
    };
    let condition = parser.or_expr().map_err(|reason| invalid(&reason))?;
    if parser.position < tokens.len() {
        return Err(invalid("unexpected trailing input"));
    }
    Ok(condition)
}

fn lex_condition(expression: &str) -> Result<Vec<CondToken>, String> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];
        if ch.is_whitespace() {
            index += 1;
        } else if ch == '\'' || ch == '"' {
            let end = chars[index + 1..]
                .iter()
                .position(|candidate| *candidate == ch)
                .ok_or_else(|| "unterminated string literal".to_string())?;
            let literal: String = chars[index + 1..index + 1 + end].iter().collect();
            tokens.push(CondToken::Quoted(literal));
            index += end + 2;
        } else if matches!(ch, '>' | '<' | '=' | '!') {
            let two: String = chars[index..(index + 2).min(chars.len())].iter().collect();
            let (op, width) = match CompareOp::parse(&two) {
                Some(op) => (op, 2),
                None => (
                    CompareOp::parse(&ch.to_string())
                        .ok_or_else(|| format!("unknown operator '{ch}'"))?,
                    1,
                ),
            };
            tokens.push(CondToken::Op(op));
            index += width;
        } else if ch.is_ascii_digit() || ch == '-' || ch == '.' {
            let end = chars[index + 1..]
                .iter()
                .position(|candidate| !(candidate.is_ascii_digit() || *candidate == '.'))
                .map_or(chars.len(), |offset| index + 1 + offset);
            let raw: String = chars[index..end].iter().collect();
            let number = raw
                .parse::<f64>()
                .map_err(|_| format!("invalid number '{raw}'"))?;
            tokens.push(CondToken::Number(number));
            index = end;
        } else if ch.is_ascii_alphabetic() || ch == '_' {
            let end = chars[index..]
                .iter()
                .position(|candidate| !(candidate.is_ascii_alphanumeric() || *candidate == '_'))
                .map_or(chars.len(), |offset| index + offset);
            tokens.push(CondToken::Word(chars[index..end].iter().collect()));
            index = end;
        } else {
            return Err(format!("unexpected character '{ch}'"));
        }
    }

    Ok(tokens)
}

struct ConditionParser<'a> {
    tokens: &'a [CondToken],
    position: usize,
}

impl ConditionParser<'_> {
    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.tokens.get(self.position), Some(CondToken::Word(word)) if word == keyword)
    }

    fn or_expr(&mut self) -> Result<Condition, String> {
        let mut left = self.and_expr()?;
        while self.peek_keyword("or") {
            self.position += 1;
            let right = self.and_expr()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Condition, String> {
        let mut left = self.term()?;
        while self.peek_keyword("and") {
            self.position += 1;
            let right = self.term()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Condition, String> {
        if self.peek_keyword("not") {
            self.position += 1;
            return Ok(Condition::Not(Box::new(self.atom()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Condition, String> {
        let name = match self.tokens.get(self.position) {
            Some(CondToken::Word(name)) => name,
            Some(_) => return Err("expected a variable".to_string()),
            None => return Err("expression ends early".to_string()),
        };
        let variable =
            Variable::parse(name).ok_or_else(|| format!("unknown variable '{name}'"))?;
        self.position += 1;

        let Some(CondToken::Op(op)) = self.tokens.get(self.position) else {
            return Ok(Condition::Present(variable));
        };
        let op = *op;
        self.position += 1;

        let operand = match self.tokens.get(self.position) {
            Some(CondToken::Number(number)) => Operand::Literal(Literal::Number(*number)),
            Some(CondToken::Quoted(text)) if matches!(op, CompareOp::Eq | CompareOp::Ne) => {
                Operand::Literal(Literal::Text(text.clone()))
            }
            Some(CondToken::Quoted(_)) => {
                return Err("strings only support == and !=".to_string())
            }
            Some(CondToken::Word(other)) => Variable::parse(other)
                .map(Operand::Variable)
                .ok_or_else(|| format!("unknown variable '{other}'"))?,
            _ => return Err("expected a value after the operator".to_string()),
        };
        self.position += 1;

        Ok(Condition::Compare {
            variable,
            op,
            operand,
        })
    }
}
