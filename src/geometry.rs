//! Vertex data, quad geometry and the per-frame uniform block.
//!
//! Layouts here mirror the declarations in `shaders/shader.vert`.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use std::mem::{offset_of, size_of};

use crate::config::SceneConfig;

/// Vertex with 2D position, RGB color and texture coordinate.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: Vec2,
    pub color: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    pub const fn new(pos: [f32; 2], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            pos: Vec2::from_array(pos),
            color: Vec3::from_array(color),
            tex_coord: Vec2::from_array(tex_coord),
        }
    }

    /// Single interleaved binding, advanced per vertex
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            // inPosition
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, pos) as u32,
            },
            // inColor
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, color) as u32,
            },
            // inTexCoord
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, tex_coord) as u32,
            },
        ]
    }
}

/// Unit quad centered on the origin in the XY plane
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5], [1.0, 0.0, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, -0.5], [0.0, 1.0, 0.0], [0.0, 0.0]),
    Vertex::new([0.5, 0.5], [0.0, 0.0, 1.0], [0.0, 1.0]),
    Vertex::new([-0.5, 0.5], [1.0, 1.0, 1.0], [1.0, 1.0]),
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Model/view/projection block bound at `binding = 0`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    pub const SIZE: usize = size_of::<Self>();

    /// Transforms for a frame `elapsed_secs` after startup.
    ///
    /// The model spins about +Z while the camera looks down at the origin
    /// from `scene.camera_eye`. The projection targets Vulkan clip space:
    /// depth in 0..1 and Y pointing down.
    pub fn animated(elapsed_secs: f32, extent: vk::Extent2D, scene: &SceneConfig) -> Self {
        let angle = (elapsed_secs * scene.rotation_speed_deg).to_radians();
        let model = Mat4::from_rotation_z(angle);

        let view = Mat4::look_at_rh(Vec3::from_array(scene.camera_eye), Vec3::ZERO, Vec3::Z);

        let mut proj = Mat4::perspective_rh(
            scene.fov_y_deg.to_radians(),
            aspect_ratio(extent),
            scene.near,
            scene.far,
        );
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }
}

/// Width over height; a degenerate extent is treated as square
pub fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    if extent.width == 0 || extent.height == 0 {
        1.0
    } else {
        extent.width as f32 / extent.height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(size_of::<Vertex>(), 28);

        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 28);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);

        let attrs = Vertex::attribute_descriptions();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        let locations: Vec<u32> = attrs.iter().map(|a| a.location).collect();
        assert_eq!(offsets, vec![0, 8, 20]);
        assert_eq!(locations, vec![0, 1, 2]);
        assert_eq!(attrs[0].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[1].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_vertex_bytes() {
        let bytes: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        assert_eq!(bytes.len(), 4 * 28);

        let first: &[f32] = bytemuck::cast_slice(&bytes[..28]);
        assert_eq!(first, &[-0.5, -0.5, 1.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_quad_indices_in_range() {
        assert_eq!(QUAD_INDICES.len(), 6);
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
    }

    #[test]
    fn test_quad_triangles_share_winding() {
        for tri in QUAD_INDICES.chunks(3) {
            let a = QUAD_VERTICES[tri[0] as usize].pos;
            let b = QUAD_VERTICES[tri[1] as usize].pos;
            let c = QUAD_VERTICES[tri[2] as usize].pos;
            let signed_area = (b - a).perp_dot(c - a);
            assert!(signed_area > 0.0, "triangle {:?} is clockwise", tri);
        }
    }

    #[test]
    fn test_ubo_size_and_alignment() {
        assert_eq!(UniformBufferObject::SIZE, 192);
        assert_eq!(std::mem::align_of::<UniformBufferObject>(), 16);

        let ubo = UniformBufferObject::default();
        assert_eq!(bytemuck::bytes_of(&ubo).len(), UniformBufferObject::SIZE);
    }

    #[test]
    fn test_model_starts_unrotated() {
        let ubo = UniformBufferObject::animated(0.0, extent(800, 600), &SceneConfig::default());
        assert!(ubo.model.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn test_model_rotates_at_configured_speed() {
        let ubo = UniformBufferObject::animated(1.0, extent(800, 600), &SceneConfig::default());
        let expected = Mat4::from_rotation_z(std::f32::consts::FRAC_PI_2);
        assert!(ubo.model.abs_diff_eq(expected, 1e-5));

        let rotated = ubo.model.transform_point3(Vec3::X);
        assert!(rotated.abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn test_view_looks_at_origin() {
        let ubo = UniformBufferObject::animated(0.0, extent(800, 600), &SceneConfig::default());
        let origin_in_view = ubo.view.transform_point3(Vec3::ZERO);
        let distance = Vec3::new(2.0, 2.0, 2.0).length();
        // Right-handed view space looks down -Z
        assert!(origin_in_view.abs_diff_eq(Vec3::new(0.0, 0.0, -distance), 1e-5));
    }

    #[test]
    fn test_projection_flips_y() {
        let scene = SceneConfig::default();
        let ubo = UniformBufferObject::animated(0.0, extent(800, 600), &scene);
        let unflipped =
            Mat4::perspective_rh(scene.fov_y_deg.to_radians(), 800.0 / 600.0, scene.near, scene.far);

        assert!(ubo.proj.y_axis.y < 0.0);
        assert_eq!(ubo.proj.y_axis.y, -unflipped.y_axis.y);
        assert_eq!(ubo.proj.x_axis, unflipped.x_axis);
    }

    #[test]
    fn test_degenerate_extent_has_finite_projection() {
        assert_eq!(aspect_ratio(extent(0, 0)), 1.0);
        assert_eq!(aspect_ratio(extent(640, 0)), 1.0);
        assert_eq!(aspect_ratio(extent(1600, 900)), 1600.0 / 900.0);

        let ubo = UniformBufferObject::animated(0.5, extent(640, 0), &SceneConfig::default());
        assert!(ubo.proj.is_finite());
    }
}
