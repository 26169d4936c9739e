//! URDF document to assembled scene object, end to end

use approx::assert_relative_eq;
use artisim::engine::{EngineCall, JointMotion};
use artisim::{
    AssemblyStrategy, DryRunEngine, HeadlessRenderer, LoaderConfig, ObjectKind, PhysicsEngine, Scene, SceneConfig,
    SimError, StructuralError,
};
use nalgebra::Vector3;
use std::io::Write;

const ARM: &str = r#"<?xml version="1.0"?>
<robot name="arm">
  <link name="base">
    <inertial>
      <mass value="1.0"/>
      <inertia ixx="0" ixy="0" ixz="0" iyy="0" iyz="0" izz="0"/>
    </inertial>
    <collision>
      <geometry><box size="0.2 0.2 0.1"/></geometry>
    </collision>
  </link>
  <link name="upper">
    <collision>
      <origin xyz="0 0 0.2" rpy="0 0 0"/>
      <geometry><cylinder radius="0.03" length="0.4"/></geometry>
    </collision>
    <visual>
      <geometry><cylinder radius="0.03" length="0.4"/></geometry>
    </visual>
  </link>
  <link name="lower">
    <collision>
      <geometry><sphere radius="0.05"/></geometry>
    </collision>
  </link>
  <joint name="shoulder" type="revolute">
    <parent link="base"/>
    <child link="upper"/>
    <origin xyz="0 0 0.05" rpy="0 0 0"/>
    <axis xyz="0 1 0"/>
    <limit lower="-1.0" upper="1.0" effort="10" velocity="1"/>
  </joint>
  <joint name="elbow" type="revolute">
    <parent link="upper"/>
    <child link="lower"/>
    <origin xyz="0 0 0.4" rpy="0 0 0"/>
    <axis xyz="0 1 0"/>
    <limit lower="-1.0" upper="1.0" effort="10" velocity="1"/>
  </joint>
</robot>
"#;

const GRIPPER: &str = r#"<?xml version="1.0"?>
<robot name="gripper">
  <link name="palm">
    <collision><geometry><box size="0.1 0.1 0.02"/></geometry></collision>
  </link>
  <link name="camera_link">
    <collision><geometry><box size="0.02 0.02 0.02"/></geometry></collision>
  </link>
  <link name="finger">
    <collision><geometry><box size="0.01 0.01 0.05"/></geometry></collision>
  </link>
  <joint name="camera_mount" type="fixed">
    <parent link="palm"/>
    <child link="camera_link"/>
    <origin xyz="0 0 0.03" rpy="0 0 0"/>
  </joint>
  <joint name="finger_slide" type="prismatic">
    <parent link="palm"/>
    <child link="finger"/>
    <origin xyz="0.04 0 0.01" rpy="0 0 0"/>
    <limit lower="0" upper="0.03" effort="5" velocity="0.1"/>
  </joint>
  <gazebo reference="camera_link">
    <sensor type="camera" name="wrist_camera">
      <camera>
        <horizontal_fov>1.2</horizontal_fov>
        <image><width>320</width><height>240</height></image>
      </camera>
    </sensor>
  </gazebo>
</robot>
"#;

fn dry_scene() -> Scene<DryRunEngine, HeadlessRenderer> {
    Scene::new(DryRunEngine::new(), HeadlessRenderer::new(), SceneConfig::default()).unwrap()
}

#[test]
fn test_arm_assembles_as_articulation() {
    let mut scene = dry_scene();
    let id = scene.create_loader().load_str(ARM).unwrap();

    let object = scene.object(id).unwrap();
    assert_eq!(object.name(), "arm");
    assert_eq!(object.kind(), ObjectKind::Articulation);
    assert_eq!(object.bodies().len(), 3);
    assert_eq!(object.dof(), 2);
    assert_eq!(scene.engine().link_count(), 3);
    assert_eq!(
        scene.engine().joint_motions(),
        vec![
            JointMotion::Revolute { limit: Some([-1.0, 1.0]) },
            JointMotion::Revolute { limit: Some([-1.0, 1.0]) },
        ]
    );

    // the zero tensor on the base leaves its mass to the estimator
    let base = object.root_body().handle;
    assert_eq!(scene.engine().mass_properties(base), None);
    assert!(scene
        .engine()
        .calls()
        .iter()
        .any(|c| *c == EngineCall::EstimateMass { body: base, density: 1000.0 }));

    let lower = object.body("lower").unwrap().handle;
    let pose = scene.engine().body_pose(lower).unwrap();
    assert_relative_eq!(pose.translation.vector, Vector3::new(0.0, 0.0, 0.45), epsilon = 1e-6);

    // collision and visual geometry both reach the renderer
    assert_eq!(scene.renderer().visual_count(), 4);
    assert!(scene.render_id_to_visual_name().values().any(|n| n == "upper_visual_0"));
}

#[test]
fn test_collapsing_fixed_joints_reduces_body_count() {
    let mut expanded = dry_scene();
    let id = expanded.create_loader().load_str(GRIPPER).unwrap();
    assert_eq!(expanded.object(id).unwrap().bodies().len(), 3);

    let mut collapsed = dry_scene();
    let config = LoaderConfig::default().with_collapse_fixed_joints(true);
    let id = collapsed
        .create_loader()
        .with_config(config)
        .load_str(GRIPPER)
        .unwrap();

    let object = collapsed.object(id).unwrap();
    assert_eq!(object.strategy(), Some(AssemblyStrategy::JointSystem));
    assert_eq!(object.bodies().len(), 2);
    assert_eq!(collapsed.engine().body_count(), 2);

    // the camera follows the palm body at the collapsed link offset
    let camera = collapsed.cameras().next().unwrap();
    assert_eq!(camera.spec.name, "wrist_camera");
    assert_eq!((camera.spec.width, camera.spec.height), (320, 240));
    let mount = camera.mount.unwrap();
    assert_eq!(mount.actor, object.root_body().id);
    assert_relative_eq!(mount.local_pose.translation.vector, Vector3::new(0.0, 0.0, 0.03), epsilon = 1e-6);
}

#[test]
fn test_unlimited_revolute_joint_is_rejected() {
    let xml = ARM.replace(r#"<limit lower="-1.0" upper="1.0" effort="10" velocity="1"/>"#, "");
    let mut scene = dry_scene();
    let err = scene.create_loader().load_str(&xml).unwrap_err();

    assert!(matches!(err, SimError::Description(ref msg) if msg.contains("shoulder")));
    assert_eq!(scene.engine().body_count(), 0);
    assert_eq!(scene.renderer().visual_count(), 0);
}

#[test]
fn test_kinematic_loop_is_structural() {
    let xml = r#"<?xml version="1.0"?>
<robot name="loop">
  <link name="a"/>
  <link name="b"/>
  <joint name="ab" type="fixed"><parent link="a"/><child link="b"/></joint>
  <joint name="ba" type="fixed"><parent link="b"/><child link="a"/></joint>
</robot>
"#;
    let mut scene = dry_scene();
    let err = scene.create_loader().load_str(xml).unwrap_err();
    assert!(matches!(err, SimError::Structural(StructuralError::KinematicLoop(_))));
}

#[test]
fn test_load_file_from_disk() {
    let mut file = tempfile::Builder::new().suffix(".urdf").tempfile().unwrap();
    file.write_all(ARM.as_bytes()).unwrap();

    let mut scene = dry_scene();
    let id = scene
        .create_loader()
        .with_config(LoaderConfig::default().with_strategy(AssemblyStrategy::Kinematic))
        .load_file(file.path())
        .unwrap();

    let object = scene.object(id).unwrap();
    assert_eq!(object.kind(), ObjectKind::KinematicArticulation);
    assert_eq!(object.qpos(), Some(&[0.0f32, 0.0][..]));
}

#[test]
fn test_rapier_arm_steps() {
    let mut scene = Scene::headless(SceneConfig::default()).unwrap();
    scene.add_ground(0.0, false).unwrap();
    let id = scene.create_loader().load_str(ARM).unwrap();

    for _ in 0..20 {
        scene.step().unwrap();
    }
    assert_eq!(scene.step_count(), 20);

    let object = scene.object(id).unwrap();
    let base = scene.engine().body_pose(object.root_body().handle).unwrap();
    // fixed root stays put
    assert_relative_eq!(base.translation.vector, Vector3::zeros(), epsilon = 1e-5);
    for body in object.bodies() {
        let pose = scene.engine().body_pose(body.handle).unwrap();
        assert!(pose.translation.vector.iter().all(|v| v.is_finite()), "{}", body.name);
    }
}

#[test]
fn test_rapier_adjacent_links_report_no_contacts() {
    let mut scene = Scene::headless(SceneConfig::default()).unwrap();
    let id = scene.create_loader().load_str(ARM).unwrap();
    let links: Vec<_> = scene.object(id).unwrap().bodies().iter().map(|b| b.id).collect();

    // the upper link's collision overlaps both neighbours at rest
    for _ in 0..50 {
        scene.step().unwrap();
        for record in scene.contact_map().iter() {
            let (a, b) = record.shapes;
            let owners = (scene.shape_owner(a), scene.shape_owner(b));
            assert!(
                !matches!(owners, (Some(x), Some(y)) if links.contains(&x) && links.contains(&y)),
                "self contact {:?}",
                owners
            );
        }
    }
    assert!(scene.contact_map().is_empty());
}
