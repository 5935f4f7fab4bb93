//! wgpu implementation of the compositor's GPU backend.
//!
//! - `context` owns the instance/adapter/device/surface wiring and collects
//!   uncaptured device errors so the render loop can fail on them.
//! - `pipeline` compiles the GLSL programs and owns the fullscreen quad.
//! - `live` holds the texture and transform uniform for the newest source frame.
//! - `ring` allocates the offscreen slot targets and checks each is usable.
//! - `uniforms` mirrors the std140 block of the live program.
//! - `state` glues everything together behind [`WgpuBackend`].

mod context;
mod live;
mod pipeline;
mod ring;
mod state;
mod uniforms;

pub use state::WgpuBackend;
