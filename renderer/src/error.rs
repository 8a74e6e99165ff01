#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("request_device failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("shader program `{style}` failed validation: {message}")]
    ShaderCompilation { style: &'static str, message: String },
    #[error("renderer is not supported on this device")]
    Unsupported,
    #[error("render failed: {0}")]
    Render(String),
    #[error("readback failed: {0}")]
    Readback(String),
    #[error("invalid elevation buffer: {0}")]
    InvalidBuffer(String),
}

pub type RendererResult<T> = Result<T, RendererError>;
