//! The narrow collaborator interface between the engine and an embedded scripting
//! runtime. The sandbox, standard library and module loader live entirely behind
//! this trait - the engine only ever compiles a chunk once, runs its `interface()`
//! once to extract a schema, and then runs its entry point once per tick.

use crate::types::InterfaceSchema;
use std::{collections::BTreeMap, fmt};

/// Standard library surfaces a script's sandbox may be granted at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StandardModule {
    Base,
    String,
    Math,
    Table,
    Debug,
}

/// Opaque handle to a compiled module object, minted and owned by whatever keeps the
/// runtime's compiled chunks (the engine, in practice). Scripts see the module's
/// return value mounted under its alias inside their sandbox; this crate only needs
/// to know the module exists and which alias it is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(pub u64);

/// Creation-time configuration for a script node. Unknown options are rejected by the
/// caller before this struct is even built; this type only holds the recognized ones.
#[derive(Debug, Clone, Default)]
pub struct CreateConfig {
    pub standard_modules: std::collections::BTreeSet<StandardModule>,
    /// alias -> module object, exactly matching the source's own `modules(...)` declaration.
    pub dependencies: BTreeMap<String, ModuleId>,
    pub name: Option<String>,
}

/// The script source was rejected by the compiler. `message` is the compiler's own
/// diagnostic, quoted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A script failed during `interface()` or `run()` execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRuntimeError {
    pub message: String,
}

impl fmt::Display for ScriptRuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A compiled, not-yet-extracted script chunk.
pub trait CompiledChunk: fmt::Debug {}

/// A primitive value crossing the engine/script boundary, independent of whatever
/// storage representation the engine keeps its own property tree in. Mirrors the
/// same ~11 primitive property types one-to-one.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    String(String),
    Vec2F(f32, f32),
    Vec3F(f32, f32, f32),
    Vec4F(f32, f32, f32, f32),
    Vec2I(i32, i32),
    Vec3I(i32, i32, i32),
    Vec4I(i32, i32, i32, i32),
}

/// The sandboxed environment a script executes against: the `IN`/`OUT` tables plus
/// whatever modules its config declared. `run()` may not suspend and executes
/// single-threaded and cooperatively - there is no async surface here.
pub trait ScriptEnvironment: fmt::Debug {
    /// Writes a value into the sandbox's `IN` table, at the dotted path from the
    /// table root (e.g. `["s1"]`), ahead of calling [`ScriptingRuntime::run_entry`].
    fn write_input(&mut self, path: &[String], value: ScriptValue);

    /// Reads a value out of the sandbox's `OUT` table at `path`, after
    /// [`ScriptingRuntime::run_entry`] has returned successfully.
    fn read_output(&self, path: &[String]) -> Option<ScriptValue>;
}

/// The narrow contract an embedded scripting runtime must provide. Everything about
/// *how* scripts are sandboxed, what their standard library looks like, and how
/// modules resolve lives behind an implementation of this trait; `logic-engine` only
/// ever calls these three operations.
pub trait ScriptingRuntime {
    type Chunk: CompiledChunk;
    type Env: ScriptEnvironment;

    /// Compiles `source` once. Does not run any of the script's code.
    fn compile(&mut self, source: &str, config: &CreateConfig) -> Result<Self::Chunk, CompileError>;

    /// Creates a fresh sandboxed environment exposing the type vocabulary
    /// (`INT`/`INT64`/`FLOAT`/`BOOL`/`STRING`/`VEC2F`..`VEC4I`/`STRUCT`/`ARRAY(N,T)`)
    /// plus the modules declared in `config`.
    fn new_environment(&mut self, config: &CreateConfig) -> Self::Env;

    /// Evaluates the chunk's `interface()` entry point exactly once, extracting the
    /// `IN`/`OUT` schema it declares. Never called again after this succeeds.
    fn run_interface(
        &mut self,
        chunk: &Self::Chunk,
        env: &mut Self::Env,
    ) -> Result<InterfaceSchema, ScriptRuntimeError>;

    /// Runs the chunk's `run()` entry point once, reading `IN` and writing `OUT`
    /// through `env`. Called once per update tick for a dirty script node.
    fn run_entry(&mut self, chunk: &Self::Chunk, env: &mut Self::Env) -> Result<(), ScriptRuntimeError>;
}
