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

//! Deterministic dataflow engine: scripted and host-bound nodes linked through a
//! typed property graph and scheduled by dependency order.
//!
//! A host application embeds an [`engine::Engine`] against its own
//! [`logic_script::ScriptingRuntime`] implementation, creates script, binding, data
//! array, animation and timer nodes, links their properties together, and calls
//! [`engine::Engine::update`] once per tick.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::mutable_key_type)]

pub mod binding;
pub mod engine;
pub mod error;
pub mod node;
pub mod property;
pub mod rotation;
pub mod script_node;
pub mod special_nodes;

mod format;

pub use binding::{
    CameraFrustum, HostAppearanceHandle, HostCameraHandle, HostNodeHandle, HostObjectHandle,
    HostObjectKind, HostSceneResolver,
};
pub use engine::{Engine, PropertyRef, UpdateReport};
pub use error::{
    CompilationError, CycleDetected, DeserializationError, EngineError, HostBindingError,
    LookupError, RuntimeError, SerializationError, UpdateInputError, ValidationError,
};
pub use format::{SavedEngineState, VersionTag, CURRENT_FILE_FORMAT_VERSION};
pub use node::{NodeKind, NodeRecord};
pub use property::{PropertyScalar, PropertyValue, Semantics};
pub use rotation::RotationMode;
pub use script_node::OptionValue;
pub use special_nodes::{AnimationChannel, Interpolation};

pub use logic_core::log;
pub use logic_graph::NodeId;
pub use logic_script::{
    CreateConfig, ModuleId, PropertyType, ScriptEnvironment, ScriptValue, ScriptingRuntime,
    StandardModule, TypeSchema,
};
