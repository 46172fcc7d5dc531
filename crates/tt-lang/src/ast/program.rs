use super::expression::{InputParam, Invocation, Stream, Table};
use super::filters::BooleanExpr;
use super::function_def::{ArgDef, ClassDef, FunctionSchema};
use super::resolved::Resolved;
use super::values::Value;

// ---------------------------------------------------------------------------
// Actions & rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Emit the current tuple to the downstream sink.
    Notify,
    /// Send the current tuple back to the program's originator. Lowered away
    /// by the type checker for remote programs.
    Return,
    Invocation(Invocation),
    /// Call of a declared action.
    VarRef {
        name: String,
        in_params: Vec<InputParam>,
        schema: Resolved<FunctionSchema>,
    },
}

/// `(stream | now) => table* => action`. `stream == None` means `now`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub stream: Option<Stream>,
    pub tables: Vec<Table>,
    pub actions: Vec<Action>,
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Query,
    Stream,
    Action,
    Procedure,
}

impl DeclarationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeclarationKind::Query => "query",
            DeclarationKind::Stream => "stream",
            DeclarationKind::Action => "action",
            DeclarationKind::Procedure => "procedure",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclarationBody {
    Table(Table),
    Stream(Stream),
    Action(Action),
}

/// `let query name := body;` — a named, reusable fragment. Procedures are
/// action-bodied declarations whose latest result is readable through
/// `result(@name)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub name: String,
    pub params: Vec<ArgDef>,
    pub body: DeclarationBody,
}

// ---------------------------------------------------------------------------
// Datasets & examples
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub kind: DeclarationKind,
    pub params: Vec<ArgDef>,
    pub body: DeclarationBody,
    pub utterances: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub examples: Vec<Example>,
}

// ---------------------------------------------------------------------------
// Program
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    ClassDef(ClassDef),
    Dataset(Dataset),
    Declaration(Declaration),
    Rule(Rule),
}

/// A complete program. `principal` is the `executor = …` contact; `None`
/// means the local self.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub principal: Option<Value>,
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn new(statements: Vec<Statement>) -> Self {
        Program {
            principal: None,
            statements,
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Rule(r) => Some(r),
            _ => None,
        })
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.statements.iter().filter_map(|s| match s {
            Statement::ClassDef(c) => Some(c),
            _ => None,
        })
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Declaration(d) => Some(d),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Permission policies
// ---------------------------------------------------------------------------

/// One side of a permission rule: which functions it covers.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionFunction {
    Builtin,
    /// Any function of a specific class: `@kind.*`.
    ClassStar(String),
    Specified {
        kind: String,
        channel: String,
        filter: BooleanExpr,
    },
    Any,
}

/// `source => query => action` permission entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionRule {
    pub principal: BooleanExpr,
    pub query: PermissionFunction,
    pub action: PermissionFunction,
}
