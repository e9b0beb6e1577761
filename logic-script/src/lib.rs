// Copyright (c) 2019-present Dmitry Stepanov and Fyrox Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Contract between the engine and an embedded scripting runtime: the type
//! vocabulary a script's `interface()` declares with, module dependency
//! declarations, and the `compile`/`run_interface`/`run_entry` collaborator trait.
//! The runtime itself (sandbox, standard library, module loader) is not implemented
//! here - only what the engine needs to drive it.

pub mod modules;
pub mod runtime;
pub mod types;

pub use modules::{check_dependencies_match, extract_declared_module_aliases, DependencyMismatch, ModuleDeclarationError};
pub use runtime::{
    CompileError, CompiledChunk, CreateConfig, ModuleId, ScriptEnvironment, ScriptRuntimeError,
    ScriptValue, ScriptingRuntime, StandardModule,
};
pub use types::{InterfaceSchema, PropertyType, TypeSchema};
