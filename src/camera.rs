use glam::{Mat4, Vec3};

use crate::transform::{MatrixExt, RenderTransform};

/// Which projection formula a camera recomputes every frame.
///
/// Chosen once when the camera is built. Calling [`Camera::perspective`] or
/// [`Camera::orthogonal`] later updates the matrix and the stored parameters
/// but not the kind, so the next frame goes back to the formula it was built with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionKind {
    Perspective,
    Orthogonal,
    /// The projection matrix is owned by the caller and never recomputed.
    Manual,
}

/// Construction parameters for a [`Camera`].
///
/// Every field is optional. Supplying `left` or `right` makes an
/// orthogonal camera; otherwise the camera is perspective.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CameraParams {
    /// Vertical field of view in degrees.
    pub fov: Option<f32>,
    pub aspect: Option<f32>,
    pub near: Option<f32>,
    pub far: Option<f32>,
    pub left: Option<f32>,
    pub right: Option<f32>,
    pub bottom: Option<f32>,
    pub top: Option<f32>,
    manual: bool,
}

impl CameraParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters for a camera whose projection matrix is set by hand.
    pub fn manual() -> Self {
        Self {
            manual: true,
            ..Self::default()
        }
    }

    pub fn fov(mut self, degrees: f32) -> Self {
        self.fov = Some(degrees);
        self
    }

    pub fn aspect(mut self, aspect: f32) -> Self {
        self.aspect = Some(aspect);
        self
    }

    pub fn clip(mut self, near: f32, far: f32) -> Self {
        self.near = Some(near);
        self.far = Some(far);
        self
    }

    pub fn bounds(mut self, left: f32, right: f32, bottom: f32, top: f32) -> Self {
        self.left = Some(left);
        self.right = Some(right);
        self.bottom = Some(bottom);
        self.top = Some(top);
        self
    }

    fn kind(&self) -> ProjectionKind {
        if self.manual {
            ProjectionKind::Manual
        } else if self.left.is_some() || self.right.is_some() {
            ProjectionKind::Orthogonal
        } else {
            ProjectionKind::Perspective
        }
    }
}

/// A camera with its projection parameters and the three matrices the
/// renderer uploads for every object.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub transform: RenderTransform,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    kind: ProjectionKind,
    pub model_view_matrix: Mat4,
    pub normal_matrix: Mat4,
    pub projection_matrix: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(CameraParams::default())
    }
}

impl Camera {
    pub const DEFAULT_FOV: f32 = 45.0;
    pub const DEFAULT_NEAR: f32 = 1e-2;
    pub const DEFAULT_FAR: f32 = 1e4;

    pub fn new(params: CameraParams) -> Self {
        let mut camera = Self {
            transform: RenderTransform::default(),
            fov: params.fov.unwrap_or(Self::DEFAULT_FOV),
            aspect: params.aspect.unwrap_or(1.0),
            near: params.near.unwrap_or(Self::DEFAULT_NEAR),
            far: params.far.unwrap_or(Self::DEFAULT_FAR),
            left: params.left.unwrap_or(0.0),
            right: params.right.unwrap_or(0.0),
            bottom: params.bottom.unwrap_or(0.0),
            top: params.top.unwrap_or(0.0),
            kind: params.kind(),
            model_view_matrix: Mat4::IDENTITY,
            normal_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
        };
        camera.update_projection();
        camera
    }

    pub fn kind(&self) -> ProjectionKind {
        self.kind
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    /// Place the camera.
    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.transform.position = Vec3::new(x, y, z);
        self
    }

    /// Set the axis the renderer's idle spin rotates the view around.
    pub fn rotating_about(mut self, axis: Vec3) -> Self {
        self.transform.rotation = axis;
        self
    }

    /// Replace the projection with a perspective one and remember its parameters.
    pub fn perspective(&mut self, fov: f32, aspect: f32, near: f32, far: f32) -> &mut Self {
        self.fov = fov;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
        self.projection_matrix = self.perspective_matrix();
        self
    }

    /// Replace the projection with an orthogonal one and remember its parameters.
    pub fn orthogonal(
        &mut self,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> &mut Self {
        self.left = left;
        self.right = right;
        self.bottom = bottom;
        self.top = top;
        self.near = near;
        self.far = far;
        self.projection_matrix = self.orthogonal_matrix();
        self
    }

    /// Recompute the projection matrix from [`kind`](Self::kind) and the stored parameters.
    pub fn update_projection(&mut self) {
        match self.kind {
            ProjectionKind::Perspective => self.projection_matrix = self.perspective_matrix(),
            ProjectionKind::Orthogonal => self.projection_matrix = self.orthogonal_matrix(),
            ProjectionKind::Manual => {}
        }
    }

    /// Rebuild the model-view matrix as `T(position) · R(angle, rotation axis)`
    /// and derive the normal matrix from it.
    pub fn update_view(&mut self, angle: f32) {
        self.model_view_matrix
            .reset()
            .translate(self.transform.position)
            .rotate(angle, self.transform.rotation);

        // Singular model-views (zero scale) keep an identity normal matrix.
        self.normal_matrix = if self.model_view_matrix.determinant().abs() > f32::EPSILON {
            self.model_view_matrix.inverse().transpose()
        } else {
            Mat4::IDENTITY
        };
    }

    fn perspective_matrix(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    fn orthogonal_matrix(&self) -> Mat4 {
        Mat4::orthographic_rh_gl(
            self.left,
            self.right,
            self.bottom,
            self.top,
            self.near,
            self.far,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let camera = Camera::default();
        assert_eq!(camera.fov, 45.0);
        assert_eq!(camera.aspect, 1.0);
        assert_eq!(camera.near, 0.01);
        assert_eq!(camera.far, 10000.0);
        assert_eq!((camera.bottom, camera.top), (0.0, 0.0));
        assert_eq!(camera.kind(), ProjectionKind::Perspective);
    }

    #[test]
    fn left_bound_alone_makes_an_orthogonal_camera() {
        let params = CameraParams {
            left: Some(5.0),
            ..Default::default()
        };
        assert_eq!(Camera::new(params).kind(), ProjectionKind::Orthogonal);
    }

    #[test]
    fn setters_do_not_change_kind() {
        let mut ortho = Camera::new(CameraParams::new().bounds(-1.0, 1.0, -1.0, 1.0));
        ortho.perspective(60.0, 1.5, 0.1, 100.0);
        assert_eq!(ortho.kind(), ProjectionKind::Orthogonal);
        assert_eq!(ortho.fov, 60.0);

        let mut persp = Camera::default();
        persp.orthogonal(-2.0, 2.0, -2.0, 2.0, 0.1, 10.0);
        assert_eq!(persp.kind(), ProjectionKind::Perspective);
    }

    #[test]
    fn per_frame_recompute_follows_the_construction_kind() {
        let mut camera = Camera::default();
        camera.orthogonal(-2.0, 2.0, -2.0, 2.0, 0.1, 10.0);
        let ortho = camera.projection_matrix;

        camera.update_projection();
        assert_ne!(camera.projection_matrix, ortho);
        assert_eq!(
            camera.projection_matrix,
            Mat4::perspective_rh_gl(45f32.to_radians(), 1.0, 0.1, 10.0)
        );
    }

    #[test]
    fn manual_projection_is_left_alone() {
        let mut camera = Camera::new(CameraParams::manual());
        let custom = Mat4::from_scale(Vec3::splat(2.0));
        camera.projection_matrix = custom;
        camera.update_projection();
        assert_eq!(camera.projection_matrix, custom);
        assert_eq!(camera.kind(), ProjectionKind::Manual);
    }

    #[test]
    fn view_translates_then_spins() {
        let mut camera = Camera::default().at(0.0, 0.0, -8.0);
        camera.update_view(0.3);
        assert_eq!(
            camera.model_view_matrix,
            Mat4::from_translation(Vec3::new(0.0, 0.0, -8.0))
        );

        let mut spinning = Camera::default().at(0.0, 0.0, -8.0).rotating_about(Vec3::Y);
        spinning.update_view(0.3);
        let expected =
            Mat4::from_translation(Vec3::new(0.0, 0.0, -8.0)) * Mat4::from_rotation_y(0.3);
        assert!(spinning.model_view_matrix.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn normal_matrix_is_inverse_transpose() {
        let mut camera = Camera::default().at(1.0, 2.0, 3.0).rotating_about(Vec3::X);
        camera.update_view(0.7);
        let expected = camera.model_view_matrix.inverse().transpose();
        assert!(camera.normal_matrix.abs_diff_eq(expected, 1e-6));
    }
}
