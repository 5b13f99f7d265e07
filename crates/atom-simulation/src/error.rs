//! Error types for the simulation engine

use glam::Vec2;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("chunk size must be positive and finite, got {0}")]
    InvalidChunkSize(Vec2),

    #[error("break bond distance must be positive and finite, got {0}")]
    InvalidBreakDistance(f32),
}

/// Failures of the GPU backend. Adapter, device and pipeline errors are fatal for the backend.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to open GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("compute pipeline creation failed: {0}")]
    Pipeline(String),

    #[error("GPU poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("result readback failed: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),

    #[error("readback callback dropped before completing")]
    ReadbackDropped,

    #[error("chunk table of {columns}x{rows} cells is too large to dispatch")]
    GridTooLarge { columns: u64, rows: u64 },
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("timestep must be finite and non-negative, got {0}")]
    InvalidTimestep(f32),

    #[error(transparent)]
    Gpu(#[from] GpuError),
}
