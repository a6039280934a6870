// origin.rs — Origin handles carried by nodes, ports and edges
//
// An origin records what a layout element was built from: a signal, a
// constant, a group of aliased signals, or the statement/operator a node
// renders. The graph substrate treats origins as opaque identity keys and
// debug labels; only the canonicalization passes look inside a few variants
// (assignments, static indexing, signal widths).
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

/// Stable identifier of a signal of the source design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub u32);

/// A signal handle. Equality covers every field, so two handles built from
/// the same design object compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signal {
    pub id: SignalId,
    pub name: String,
    pub width: Option<u32>,
    /// Hidden signals are anonymous expression results, never pass-through
    /// endpoints of their own.
    pub hidden: bool,
}

impl Signal {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id: SignalId(id),
            name: name.into(),
            width: None,
            hidden: false,
        }
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Ordering key used wherever ports are sorted by signal.
    pub fn sort_key(&self) -> (&str, SignalId) {
        (&self.name, self.id)
    }
}

/// A constant value, kept as its rendered text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Const {
    pub value: String,
    pub width: Option<u32>,
}

impl Const {
    pub fn new(value: impl Into<String>, width: Option<u32>) -> Self {
        Self {
            value: value.into(),
            width,
        }
    }
}

/// Inclusive bit range `[hi:lo]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitRange {
    pub hi: u32,
    pub lo: u32,
}

impl BitRange {
    pub fn new(hi: u32, lo: u32) -> Self {
        debug_assert!(hi >= lo, "inverted bit range [{hi}:{lo}]");
        Self { hi, lo }
    }

    pub fn bit(bit: u32) -> Self {
        Self { hi: bit, lo: bit }
    }

    /// Bit count; `[u32::MAX:0]` does not fit a `u32`.
    pub fn width(&self) -> u64 {
        u64::from(self.hi) - u64::from(self.lo) + 1
    }

    /// Port label: `[hi:lo]`, or `[bit]` for a single bit.
    pub fn label(&self) -> String {
        if self.hi == self.lo {
            format!("[{}]", self.lo)
        } else {
            format!("[{}:{}]", self.hi, self.lo)
        }
    }
}

/// Index operand of an indexing operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexValue {
    Static(BitRange),
    /// Index driven by a non-constant signal.
    Dynamic,
}

/// Source operand of an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Signal(Signal),
    Const(Const),
}

/// `dst[indexes...] = src`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Assignment {
    pub src: Operand,
    pub dst: Signal,
    pub indexes: Vec<IndexValue>,
}

impl Assignment {
    /// An assignment without sub-indexing from a named (non-hidden) signal.
    pub fn is_identity(&self) -> bool {
        self.indexes.is_empty() && !matches!(&self.src, Operand::Signal(s) if s.hidden)
    }
}

/// `src[index]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexOp {
    pub src: Signal,
    pub index: IndexValue,
}

/// What a node, port or edge was built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    Signal(Signal),
    Const(Const),
    /// Several signal handles that resolved to one net.
    AliasGroup(Vec<Signal>),
    Assignment(Assignment),
    Index(IndexOp),
    /// Operator node, by operator name.
    Operator(String),
    /// Compound statement (if/switch/process), by kind.
    Statement(String),
    /// Component instance, by module name.
    Component(String),
    /// Node created by fusing the listed originals.
    Fused(Vec<Origin>),
}

impl Origin {
    /// Bit width of the value this origin carries, when known.
    pub fn width(&self) -> Option<u32> {
        match self {
            Origin::Signal(s) => s.width,
            Origin::Const(c) => c.width,
            Origin::AliasGroup(sigs) => sigs.first().and_then(|s| s.width),
            _ => None,
        }
    }

    /// Primary signal of a signal or alias-group origin.
    pub fn signal(&self) -> Option<&Signal> {
        match self {
            Origin::Signal(s) => Some(s),
            Origin::AliasGroup(sigs) => sigs.first(),
            _ => None,
        }
    }

    /// Nodes rendered from statements get their ports sorted by signal.
    pub fn is_statement(&self) -> bool {
        matches!(self, Origin::Assignment(_) | Origin::Statement(_))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Signal(s) => write!(f, "{}", s.name),
            Operand::Const(c) => write!(f, "{}", c.value),
        }
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValue::Static(r) => write!(f, "{}", r.label()),
            IndexValue::Dynamic => write!(f, "[?]"),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Signal(s) => write!(f, "{}", s.name),
            Origin::Const(c) => write!(f, "{}", c.value),
            Origin::AliasGroup(sigs) => {
                write!(f, "(")?;
                for (i, s) in sigs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", s.name)?;
                }
                write!(f, ")")
            }
            Origin::Assignment(a) => {
                write!(f, "{}", a.dst.name)?;
                for i in &a.indexes {
                    write!(f, "{i}")?;
                }
                write!(f, " = {}", a.src)
            }
            Origin::Index(op) => write!(f, "{}{}", op.src.name, op.index),
            Origin::Operator(op) => write!(f, "{op}"),
            Origin::Statement(kind) => write!(f, "{kind}"),
            Origin::Component(module) => write!(f, "{module}"),
            Origin::Fused(parts) => write!(f, "fused({})", parts.len()),
        }
    }
}
