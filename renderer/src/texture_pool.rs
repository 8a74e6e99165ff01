//! Reusable render textures. Each texture is checked out by exactly one draw
//! at a time and handed back afterwards.

use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// Textures kept around for reuse; anything released beyond this is destroyed.
pub const MAX_POOLED_TEXTURES: usize = 10;

/// Size, format and usage a pooled texture must match to be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSpec {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

impl TextureSpec {
    /// Single-channel float texture holding a padded elevation buffer.
    pub fn elevation(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        }
    }

    /// RGBA colour target that is copied back to the host.
    pub fn render_target(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        }
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

/// GPU context able to create and destroy textures.
pub trait TextureAllocator {
    type Texture;

    fn allocate(&self, spec: &TextureSpec) -> Self::Texture;
    fn free(&self, texture: Self::Texture);
}

impl TextureAllocator for wgpu::Device {
    type Texture = wgpu::Texture;

    fn allocate(&self, spec: &TextureSpec) -> wgpu::Texture {
        self.create_texture(&wgpu::TextureDescriptor {
            label: Some("terrain-pooled-tex"),
            size: spec.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: spec.format,
            usage: spec.usage,
            view_formats: &[],
        })
    }

    fn free(&self, texture: wgpu::Texture) {
        texture.destroy();
    }
}

/// A texture checked out of the pool.
#[derive(Debug)]
pub struct PooledTexture<T> {
    pub spec: TextureSpec,
    pub texture: T,
}

#[derive(Debug)]
pub struct TexturePool<T> {
    idle: Mutex<Vec<PooledTexture<T>>>,
    capacity: usize,
}

impl<T> Default for TexturePool<T> {
    fn default() -> Self {
        Self::with_capacity(MAX_POOLED_TEXTURES)
    }
}

impl<T> TexturePool<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Take a matching idle texture or allocate a new one.
    pub fn acquire<A>(&self, allocator: &A, spec: TextureSpec) -> PooledTexture<T>
    where
        A: TextureAllocator<Texture = T>,
    {
        let reused = {
            let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
            idle.iter()
                .position(|pooled| pooled.spec == spec)
                .map(|index| idle.swap_remove(index))
        };
        reused.unwrap_or_else(|| PooledTexture {
            spec,
            texture: allocator.allocate(&spec),
        })
    }

    /// Return a texture for reuse, destroying it if the pool is full.
    pub fn release<A>(&self, allocator: &A, pooled: PooledTexture<T>)
    where
        A: TextureAllocator<Texture = T>,
    {
        let overflow = {
            let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
            if idle.len() < self.capacity {
                idle.push(pooled);
                None
            } else {
                Some(pooled)
            }
        };
        if let Some(pooled) = overflow {
            debug!(width = pooled.spec.width, "texture pool full, destroying texture");
            allocator.free(pooled.texture);
        }
    }

    /// Destroy every idle texture.
    pub fn cleanup<A>(&self, allocator: &A)
    where
        A: TextureAllocator<Texture = T>,
    {
        let drained: Vec<_> = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for pooled in drained {
            allocator.free(pooled.texture);
        }
    }

    pub fn live_pooled(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
