//! Gazebo sensor extension parser
//!
//! Extracts camera mounts from `<gazebo reference="link">` blocks. Only
//! `camera` and `depth` sensors become mounts; ray sensors are reported and
//! skipped.

use super::CameraMount;
use crate::error::{SimError, SimResult};
use crate::math::pose_from_origin;
use nalgebra::Isometry3;
use roxmltree::{Document, Node};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_HORIZONTAL_FOV: f32 = 1.047;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Camera,
    Depth,
    Ray,
}

impl SensorKind {
    fn from_attr(value: &str) -> Option<Self> {
        match value {
            "camera" => Some(SensorKind::Camera),
            "depth" => Some(SensorKind::Depth),
            "ray" => Some(SensorKind::Ray),
            _ => None,
        }
    }
}

/// Parser for Gazebo camera sensors
pub struct CameraSensorParser;

impl CameraSensorParser {
    /// Parse every camera mount declared in a URDF document
    pub fn parse(urdf_xml: &str) -> SimResult<Vec<CameraMount>> {
        let doc = Document::parse(urdf_xml)
            .map_err(|e| SimError::description(format!("failed to parse gazebo extensions: {}", e)))?;

        let mut mounts = Vec::new();
        for gazebo in doc.descendants().filter(|n| n.tag_name().name() == "gazebo") {
            let Some(reference) = gazebo.attribute("reference") else {
                continue;
            };
            for sensor in gazebo.children().filter(|n| n.tag_name().name() == "sensor") {
                if let Some(mount) = Self::parse_sensor(&sensor, reference) {
                    mounts.push(mount);
                }
            }
        }

        Ok(mounts)
    }

    fn parse_sensor(sensor: &Node, reference: &str) -> Option<CameraMount> {
        let kind_attr = sensor.attribute("type").unwrap_or_default();
        let name = sensor.attribute("name").unwrap_or(reference);

        let kind = match SensorKind::from_attr(kind_attr) {
            Some(SensorKind::Ray) => {
                tracing::warn!("ray sensor '{}' is not supported, skipping", name);
                return None;
            }
            Some(kind) => kind,
            None => {
                tracing::warn!("unknown gazebo sensor type '{}' on '{}'", kind_attr, name);
                return None;
            }
        };

        let camera = child(sensor, "camera");
        let image = camera.and_then(|c| child(&c, "image"));

        let width = image
            .and_then(|i| child_value::<u32>(&i, "width"))
            .unwrap_or(DEFAULT_WIDTH);
        let height = image
            .and_then(|i| child_value::<u32>(&i, "height"))
            .unwrap_or(DEFAULT_HEIGHT);
        let fovx = camera
            .and_then(|c| child_value::<f32>(&c, "horizontal_fov"))
            .unwrap_or(DEFAULT_HORIZONTAL_FOV);
        // square pixels unless stated otherwise
        let fovy = camera
            .and_then(|c| child_value::<f32>(&c, "vertical_fov"))
            .unwrap_or_else(|| vertical_fov(fovx, width, height));

        Some(CameraMount {
            name: name.to_string(),
            reference: reference.to_string(),
            origin: child(sensor, "pose")
                .and_then(|n| n.text())
                .and_then(parse_pose)
                .unwrap_or_else(Isometry3::identity),
            width,
            height,
            fovx,
            fovy,
            depth: kind == SensorKind::Depth,
        })
    }
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.tag_name().name() == tag)
}

fn child_value<T: std::str::FromStr>(node: &Node, tag: &str) -> Option<T> {
    child(node, tag)
        .and_then(|n| n.text())
        .and_then(|t| t.trim().parse().ok())
}

fn parse_pose(text: &str) -> Option<Isometry3<f32>> {
    let parts: Vec<f32> = text
        .split_whitespace()
        .filter_map(|s| s.parse().ok())
        .collect();

    if parts.len() == 6 {
        Some(pose_from_origin(
            [parts[0], parts[1], parts[2]],
            [parts[3], parts[4], parts[5]],
        ))
    } else {
        None
    }
}

fn vertical_fov(fovx: f32, width: u32, height: u32) -> f32 {
    if width == 0 {
        return fovx;
    }
    2.0 * ((fovx / 2.0).tan() * height as f32 / width as f32).atan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_camera_sensor() {
        let urdf_xml = r#"
        <robot name="test">
            <gazebo reference="head">
                <sensor type="camera" name="head_cam">
                    <pose>0.1 0 0.2 0 0 0</pose>
                    <camera>
                        <horizontal_fov>1.2</horizontal_fov>
                        <vertical_fov>0.9</vertical_fov>
                        <image><width>320</width><height>240</height></image>
                    </camera>
                </sensor>
            </gazebo>
        </robot>
        "#;

        let mounts = CameraSensorParser::parse(urdf_xml).unwrap();
        assert_eq!(mounts.len(), 1);

        let cam = &mounts[0];
        assert_eq!(cam.name, "head_cam");
        assert_eq!(cam.reference, "head");
        assert_eq!((cam.width, cam.height), (320, 240));
        assert_relative_eq!(cam.fovx, 1.2);
        assert_relative_eq!(cam.fovy, 0.9);
        assert_relative_eq!(cam.origin.translation.vector.x, 0.1);
        assert!(!cam.depth);
    }

    #[test]
    fn test_depth_sensor_derives_vertical_fov() {
        let urdf_xml = r#"
        <robot name="test">
            <gazebo reference="wrist">
                <sensor type="depth" name="wrist_depth">
                    <camera>
                        <horizontal_fov>1.5707963</horizontal_fov>
                        <image><width>200</width><height>200</height></image>
                    </camera>
                </sensor>
            </gazebo>
        </robot>
        "#;

        let mounts = CameraSensorParser::parse(urdf_xml).unwrap();
        assert!(mounts[0].depth);
        assert_relative_eq!(mounts[0].fovy, mounts[0].fovx, epsilon = 1e-5);
    }

    #[test]
    fn test_ray_sensor_skipped() {
        let urdf_xml = r#"
        <robot name="test">
            <gazebo reference="laser_link">
                <sensor type="ray" name="laser"/>
            </gazebo>
            <gazebo>
                <sensor type="camera" name="unreferenced"/>
            </gazebo>
        </robot>
        "#;

        assert!(CameraSensorParser::parse(urdf_xml).unwrap().is_empty());
    }
}
