//! 計算バックエンドの選択

use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use burn_wgpu::{Wgpu, WgpuDevice};

use crate::model::DeviceType;

/// GPU学習用バックエンド
pub type GpuBackend = Autodiff<Wgpu>;

/// CPU学習用バックエンド
pub type CpuBackend = Autodiff<NdArray<f32>>;

/// CPU推論用バックエンド
pub type CpuInferenceBackend = NdArray<f32>;

pub fn gpu_device() -> WgpuDevice {
    WgpuDevice::default()
}

pub fn cpu_device() -> NdArrayDevice {
    NdArrayDevice::Cpu
}

/// ログ表示用のバックエンド名
pub fn backend_name(device_type: DeviceType) -> &'static str {
    match device_type {
        DeviceType::Wgpu => "wgpu",
        DeviceType::Cpu => "ndarray",
    }
}
