//! Error types for windflow.
//!
//! Initialization failures (missing float textures, shader errors) are fatal
//! and surface as [`LayerError`] from [`WindLayer::attach`](crate::WindLayer::attach).
//! Configuration and viewport errors are recoverable: the previous valid
//! state is kept.

use std::fmt;

/// Errors that can occur during GPU initialization or resource access.
#[derive(Debug)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    SurfaceCreation(wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// The adapter cannot render to or sample a required float format.
    MissingFloatTextures(wgpu::TextureFormat),
    /// A shader failed to compile or a pipeline failed to link.
    ShaderCompilation {
        /// Which program failed.
        stage: &'static str,
        /// Validation message reported by the device.
        message: String,
    },
    /// A texture exceeds the device's 2D dimension limit.
    TextureTooLarge {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Device limit.
        max: u32,
    },
    /// Failed to map buffer for reading.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::SurfaceCreation(e) => write!(f, "Failed to create GPU surface: {}", e),
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::MissingFloatTextures(format) => write!(
                f,
                "GPU lacks floating-point texture support: {:?} cannot be sampled and rendered to",
                format
            ),
            GpuError::ShaderCompilation { stage, message } => {
                write!(f, "{} program failed to build: {}", stage, message)
            }
            GpuError::TextureTooLarge { width, height, max } => write!(
                f,
                "Texture of {}x{} exceeds the device limit of {} texels per side",
                width, height, max
            ),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::SurfaceCreation(e) => Some(e),
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::CreateSurfaceError> for GpuError {
    fn from(e: wgpu::CreateSurfaceError) -> Self {
        GpuError::SurfaceCreation(e)
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors for malformed vector field data.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    /// Width or height is zero.
    EmptyGrid,
    /// A component array does not hold `width * height` values.
    LengthMismatch {
        /// Component name (`"u"` or `"v"`).
        component: &'static str,
        /// Expected number of values.
        expected: usize,
        /// Actual number of values.
        actual: usize,
    },
    /// Bounds are non-finite or have zero/negative extent.
    DegenerateBounds,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::EmptyGrid => write!(f, "Vector field grid has zero width or height"),
            FieldError::LengthMismatch {
                component,
                expected,
                actual,
            } => write!(
                f,
                "Vector field component '{}' has {} values, expected {}",
                component, actual, expected
            ),
            FieldError::DegenerateBounds => {
                write!(f, "Vector field bounds must be finite with max > min on both axes")
            }
        }
    }
}

impl std::error::Error for FieldError {}

/// Errors for rejected configuration values.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Particle count must be positive.
    ZeroParticleCount,
    /// A color string is not `#RRGGBB`.
    InvalidColor(String),
    /// A color list was empty.
    EmptyColorList,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroParticleCount => write!(f, "Particle count must be greater than zero"),
            ConfigError::InvalidColor(s) => write!(f, "Invalid color '{}', expected #RRGGBB", s),
            ConfigError::EmptyColorList => write!(f, "Color list must contain at least one color"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors for invalid viewport updates.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewportError {
    /// Pixel width or height is zero.
    ZeroSize,
    /// Corners are non-finite or do not span an area.
    DegenerateBounds,
}

impl fmt::Display for ViewportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewportError::ZeroSize => write!(f, "Viewport pixel size must be non-zero"),
            ViewportError::DegenerateBounds => {
                write!(f, "Viewport corners must be finite and span a non-empty area")
            }
        }
    }
}

impl std::error::Error for ViewportError {}

/// Errors from attaching or driving a wind layer.
#[derive(Debug)]
pub enum LayerError {
    /// GPU initialization failed.
    Gpu(GpuError),
    /// Vector field data was rejected.
    Field(FieldError),
    /// Initial viewport was rejected.
    Viewport(ViewportError),
    /// The layer was detached and holds no GPU resources.
    Detached,
}

impl fmt::Display for LayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerError::Gpu(e) => write!(f, "GPU error: {}", e),
            LayerError::Field(e) => write!(f, "Field error: {}", e),
            LayerError::Viewport(e) => write!(f, "Viewport error: {}", e),
            LayerError::Detached => write!(f, "Wind layer is detached"),
        }
    }
}

impl std::error::Error for LayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LayerError::Gpu(e) => Some(e),
            LayerError::Field(e) => Some(e),
            LayerError::Viewport(e) => Some(e),
            LayerError::Detached => None,
        }
    }
}

impl From<GpuError> for LayerError {
    fn from(e: GpuError) -> Self {
        LayerError::Gpu(e)
    }
}

impl From<FieldError> for LayerError {
    fn from(e: FieldError) -> Self {
        LayerError::Field(e)
    }
}

impl From<ViewportError> for LayerError {
    fn from(e: ViewportError) -> Self {
        LayerError::Viewport(e)
    }
}

/// Errors that can occur when running the demo window.
#[derive(Debug)]
pub enum AppError {
    /// Failed to create event loop.
    EventLoop(winit::error::EventLoopError),
    /// Failed to create window.
    Window(winit::error::OsError),
    /// The wind layer could not be attached.
    Layer(LayerError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::EventLoop(e) => write!(f, "Failed to create event loop: {}", e),
            AppError::Window(e) => write!(f, "Failed to create window: {}", e),
            AppError::Layer(e) => write!(f, "Wind layer error: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::EventLoop(e) => Some(e),
            AppError::Window(e) => Some(e),
            AppError::Layer(e) => Some(e),
        }
    }
}

impl From<winit::error::EventLoopError> for AppError {
    fn from(e: winit::error::EventLoopError) -> Self {
        AppError::EventLoop(e)
    }
}

impl From<winit::error::OsError> for AppError {
    fn from(e: winit::error::OsError) -> Self {
        AppError::Window(e)
    }
}

impl From<LayerError> for AppError {
    fn from(e: LayerError) -> Self {
        AppError::Layer(e)
    }
}

impl From<GpuError> for AppError {
    fn from(e: GpuError) -> Self {
        AppError::Layer(LayerError::Gpu(e))
    }
}
