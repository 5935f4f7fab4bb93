use std::time::Duration;

/// Failures that end a compositor session.
///
/// Setup variants are reported once through the session's termination signal
/// and are never retried by the compositor itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositorError {
    #[error("invalid compositor configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to create graphics context: {0}")]
    ContextCreation(String),
    #[error("presentation surface still invalid after {attempts} checks")]
    SurfaceUnavailable { attempts: u32 },
    #[error("failed to compile shader `{label}`: {diagnostics}")]
    ShaderCompile { label: String, diagnostics: String },
    #[error("failed to link pipeline `{label}`: {diagnostics}")]
    Link { label: String, diagnostics: String },
    #[error("ring slot {index} is not a complete render target: {status}")]
    IncompleteRenderTarget { index: usize, status: String },
    #[error("GPU failure while rendering: {0}")]
    Runtime(String),
    #[error("failed to spawn render thread: {0}")]
    Spawn(String),
    #[error("session did not become ready within {0:?}")]
    NotReady(Duration),
    #[error("session ended before it became ready")]
    Ended,
}

impl CompositorError {
    /// True for failures raised before the render loop started.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            CompositorError::InvalidConfig(_)
                | CompositorError::ContextCreation(_)
                | CompositorError::SurfaceUnavailable { .. }
                | CompositorError::ShaderCompile { .. }
                | CompositorError::Link { .. }
                | CompositorError::IncompleteRenderTarget { .. }
                | CompositorError::Spawn(_)
        )
    }
}

/// Rejections raised when a frame source submits an unusable frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame is {actual_width}x{actual_height}, sink expects {expected_width}x{expected_height}")]
    SizeMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("frame carries {actual} bytes, RGBA8 {width}x{height} needs {expected}")]
    PixelCount {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}
