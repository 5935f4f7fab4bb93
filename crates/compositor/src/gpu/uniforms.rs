use bytemuck::{Pod, Zeroable};

use crate::live::SampleTransform;

/// std140 mirror of the `LiveParams` block in the live fragment shader.
#[repr(C, align(16))]
#[derive(Clone, Copy)]
pub(crate) struct LiveUniforms {
    pub sample_transform: [f32; 16],
}

unsafe impl Zeroable for LiveUniforms {}
unsafe impl Pod for LiveUniforms {}

impl LiveUniforms {
    pub fn new(transform: SampleTransform) -> Self {
        Self {
            sample_transform: transform.0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for LiveUniforms {
    fn default() -> Self {
        Self::new(SampleTransform::identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_std140_mat4_size() {
        assert_eq!(std::mem::size_of::<LiveUniforms>(), 64);
        let uniforms = LiveUniforms::new(SampleTransform::horizontal_flip());
        let floats: &[f32] = bytemuck::cast_slice(uniforms.as_bytes());
        assert_eq!(floats[0], -1.0);
        assert_eq!(floats[12], 1.0);
    }
}
