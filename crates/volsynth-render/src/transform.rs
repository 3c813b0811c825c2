use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Volume texture sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Filter {
    #[default]
    Linear,
    Nearest,
}

/// Model, view and projection matrices shared by every render target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            model: model_matrix(Vec3::ONE, Vec3::ZERO),
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

impl Transform {
    pub fn model_view_projection(&self) -> Mat4 {
        self.projection * self.view * self.model
    }

    /// Maps clip space back to the volume's unit cube.
    pub fn inverse_model_view_projection(&self) -> Mat4 {
        self.model_view_projection().inverse()
    }
}

/// Model matrix placing the unit volume cube centered on `translation`,
/// scaled per axis: `T(translation) · S(scale) · T(-0.5)`.
pub fn model_matrix(scale: Vec3, translation: Vec3) -> Mat4 {
    Mat4::from_translation(translation)
        * Mat4::from_scale(scale)
        * Mat4::from_translation(Vec3::splat(-0.5))
}
