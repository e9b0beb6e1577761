//! Error kinds produced by the engine's public API. Every fallible operation returns
//! a `Result` and, on failure, the same information is appended to the engine's
//! internal error list (see [`crate::engine::Engine::take_errors`]).

use logic_core::visitor::VisitError;
use std::fmt;

/// Type/direction/declaration mismatches caught before any state is mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    NotAnOutput,
    NotAnInput,
    WrongDirection,
    ContainerNotAllowed,
    TypeMismatch { expected: String, found: String },
    SameNode,
    AlreadyLinked,
    DifferentEngines,
    NotCurrentlyLinked,
    EmptyDataArray,
    DuplicateDeclaration(String),
    LinkedInputIsReadOnly,
    WrongArity { expected: usize, found: usize },
    WouldTruncate,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NotAnOutput => write!(f, "source property is not an output"),
            ValidationError::NotAnInput => write!(f, "target property is not an input"),
            ValidationError::WrongDirection => write!(f, "link direction is invalid"),
            ValidationError::ContainerNotAllowed => write!(f, "containers cannot be linked"),
            ValidationError::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {expected}, found {found}")
            }
            ValidationError::SameNode => write!(f, "source and target belong to the same node"),
            ValidationError::AlreadyLinked => write!(f, "target already has an incoming link"),
            ValidationError::DifferentEngines => {
                write!(f, "source and target belong to different engines")
            }
            ValidationError::NotCurrentlyLinked => write!(f, "no such link is currently active"),
            ValidationError::EmptyDataArray => write!(f, "data array must have at least one element"),
            ValidationError::DuplicateDeclaration(name) => {
                write!(f, "duplicate declaration: {name}")
            }
            ValidationError::LinkedInputIsReadOnly => {
                write!(f, "cannot set a property that has an active incoming link")
            }
            ValidationError::WrongArity { expected, found } => {
                write!(f, "expected {expected} components, found {found}")
            }
            ValidationError::WouldTruncate => {
                write!(f, "assignment would silently round or truncate the value")
            }
        }
    }
}

/// An object/property/node could not be located.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupError {
    ForeignEngine,
    MissingChild(String),
    UnknownNode,
    UnknownProperty,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::ForeignEngine => write!(f, "object belongs to a different engine"),
            LookupError::MissingChild(name) => write!(f, "no such child property: {name}"),
            LookupError::UnknownNode => write!(f, "node was not created by this engine"),
            LookupError::UnknownProperty => write!(f, "property does not exist"),
        }
    }
}

/// A script's source was rejected outright, or its module declarations were wrong.
#[derive(Debug, Clone, PartialEq)]
pub enum CompilationError {
    /// The compiler's own diagnostic, quoted verbatim.
    Rejected(String),
    DependencyMismatch(logic_script::DependencyMismatch),
    ModuleDeclaration(logic_script::ModuleDeclarationError),
    UnknownCreateOption(String),
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilationError::Rejected(msg) => write!(f, "{msg}"),
            CompilationError::DependencyMismatch(m) => write!(f, "{m}"),
            CompilationError::ModuleDeclaration(e) => write!(f, "{e}"),
            CompilationError::UnknownCreateOption(opt) => {
                write!(f, "unknown creation option: {opt}")
            }
        }
    }
}

/// A script raised an error while running, identified by the node that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub node: logic_graph::NodeId,
    pub message: String,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {:?}: {}", self.node, self.message)
    }
}

/// Raised when a topological order could not be produced because a link cycle exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleDetected;

impl fmt::Display for CycleDetected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the link graph contains a cycle")
    }
}

/// `save` failed.
#[derive(Debug, Clone, PartialEq)]
pub enum SerializationError {
    CyclePresent,
    Io(String),
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationError::CyclePresent => {
                write!(f, "refusing to save while a link cycle is present")
            }
            SerializationError::Io(msg) => write!(f, "{msg}"),
        }
    }
}

/// `load` failed, with the specific reason required by the format's verification pass.
#[derive(Debug, Clone, PartialEq)]
pub enum DeserializationError {
    UnsupportedFileFormatVersion { found: u32, supported: u32 },
    RequiredFieldAbsent(String),
    HostObjectNotFound { kind: String, name: String, id: u64 },
    HostObjectKindMismatch { expected: String, found: String },
    DanglingLinkProperty { node: u64, path: String },
    InvariantViolated(String),
    MissingResolver,
    Format(VisitError),
}

impl fmt::Display for DeserializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeserializationError::UnsupportedFileFormatVersion { found, supported } => write!(
                f,
                "unsupported file format version {found}, this build supports {supported}"
            ),
            DeserializationError::RequiredFieldAbsent(name) => {
                write!(f, "required field absent: {name}")
            }
            DeserializationError::HostObjectNotFound { kind, name, id } => write!(
                f,
                "host object not found: kind={kind} name={name} id={id}"
            ),
            DeserializationError::HostObjectKindMismatch { expected, found } => write!(
                f,
                "host object kind mismatch: expected {expected}, found {found}"
            ),
            DeserializationError::DanglingLinkProperty { node, path } => {
                write!(f, "link references a property that no longer exists: node={node} path={path}")
            }
            DeserializationError::InvariantViolated(msg) => write!(f, "{msg}"),
            DeserializationError::MissingResolver => {
                write!(f, "no host-object resolver was supplied, but bindings are present")
            }
            DeserializationError::Format(e) => write!(f, "{e}"),
        }
    }
}

impl From<VisitError> for DeserializationError {
    fn from(e: VisitError) -> Self {
        DeserializationError::Format(e)
    }
}

/// A binding could not reach or write to its host object.
#[derive(Debug, Clone, PartialEq)]
pub enum HostBindingError {
    HostObjectVanished,
    KindMismatch { expected: String, found: String },
    InvariantViolated(String),
}

impl fmt::Display for HostBindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostBindingError::HostObjectVanished => write!(f, "host object no longer exists"),
            HostBindingError::KindMismatch { expected, found } => {
                write!(f, "host object kind mismatch: expected {expected}, found {found}")
            }
            HostBindingError::InvariantViolated(msg) => write!(f, "{msg}"),
        }
    }
}

/// A timer's externally supplied ticker violated monotonicity.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateInputError {
    pub message: String,
}

impl fmt::Display for UpdateInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// The union of every error kind the engine's public API can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Validation(ValidationError),
    Lookup(LookupError),
    Compilation(CompilationError),
    Runtime(RuntimeError),
    Cycle(CycleDetected),
    Serialization(SerializationError),
    Deserialization(DeserializationError),
    HostBinding(HostBindingError),
    UpdateInput(UpdateInputError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Validation(e) => write!(f, "{e}"),
            EngineError::Lookup(e) => write!(f, "{e}"),
            EngineError::Compilation(e) => write!(f, "{e}"),
            EngineError::Runtime(e) => write!(f, "{e}"),
            EngineError::Cycle(e) => write!(f, "{e}"),
            EngineError::Serialization(e) => write!(f, "{e}"),
            EngineError::Deserialization(e) => write!(f, "{e}"),
            EngineError::HostBinding(e) => write!(f, "{e}"),
            EngineError::UpdateInput(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {}

macro_rules! from_variant {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for EngineError {
            fn from(e: $ty) -> Self {
                EngineError::$variant(e)
            }
        }
    };
}

from_variant!(Validation, ValidationError);
from_variant!(Lookup, LookupError);
from_variant!(Compilation, CompilationError);
from_variant!(Runtime, RuntimeError);
from_variant!(Cycle, CycleDetected);
from_variant!(Serialization, SerializationError);
from_variant!(Deserialization, DeserializationError);
from_variant!(HostBinding, HostBindingError);
from_variant!(UpdateInput, UpdateInputError);
