// Copyright (c) 2019-present the aural-core contributors.
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

//! Real-time 3D audio auralization core.
//!
//! Spatializes emitters against a listener, ray-traces scene geometry for
//! occlusion and room acoustics, and multiplexes both onto a small, fixed
//! set of hardware voices and reverb effect slots. A hosting engine drives
//! everything through [`engine::Engine`]; [`backend::AudioBackend`] is the
//! only seam a platform audio driver needs to implement.

pub mod asset;
pub mod backend;
pub mod config;
pub mod devmode;
pub mod effect_pool;
pub mod emitter;
pub mod engine;
pub mod environment;
pub mod error;
pub mod layer_mask;
pub mod log;
pub mod math;
pub mod pool;
pub mod probe;
pub mod runtime;
pub mod source_pool;
pub mod spatial;
pub mod trace;
pub mod world;

pub use config::Config;
pub use engine::Engine;
pub use error::AuralError;
