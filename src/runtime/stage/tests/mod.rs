//! Stage 单元测试
//!
//! 测试角色管理、克隆计数、渲染器属性转发和重绘请求

use crate::render::{HeadlessRenderer, Layer};
use crate::runtime::ids::TargetId;
use crate::runtime::stage::{Bubble, BubbleKind, RotationStyle, Stage, Target, TargetSpec, MAX_SIZE, MIN_SIZE};

fn cat() -> TargetId {
    TargetId::from("cat")
}

fn stage_with_renderer() -> (Stage, HeadlessRenderer) {
    let renderer = HeadlessRenderer::new();
    let mut stage = Stage::new(300);
    stage.add_target(Target::stage("stage"));
    stage.add_target(Target::sprite("cat", "Cat"));
    stage.attach_renderer(Box::new(renderer.clone()));
    (stage, renderer)
}

#[cfg(test)]
mod target_tests {
    use super::*;

    #[test]
    fn test_from_spec_applies_defaults_and_clamps() {
        let spec: TargetSpec = serde_json::from_value(serde_json::json!({
            "id": "cat",
            "name": "Cat",
            "size": 9000,
            "direction": 270,
            "costume": 5,
            "costumeCount": 2,
            "rotationStyle": "left-right"
        }))
        .unwrap();
        let target = Target::from_spec(spec);
        assert_eq!(target.size, MAX_SIZE);
        assert_eq!(target.direction, -90.0);
        assert_eq!(target.costume, 1);
        assert_eq!(target.rotation_style, RotationStyle::LeftRight);
        assert!(target.visible);
        assert!(target.is_original());
    }

    #[test]
    fn test_clone_points_at_original() {
        let original = Target::sprite("cat", "Cat");
        let clone = original.make_clone(TargetId::from("c1"));
        let grandchild = clone.make_clone(TargetId::from("c2"));
        assert_eq!(clone.script_owner(), &cat());
        assert_eq!(grandchild.script_owner(), &cat());
        assert!(!grandchild.is_original());
    }

    #[test]
    fn test_left_right_flips_scale() {
        let mut target = Target::sprite("cat", "Cat");
        target.rotation_style = RotationStyle::LeftRight;
        target.direction = -90.0;
        let (direction, scale) = target.rendered_direction_and_scale();
        assert_eq!(direction, 90.0);
        assert_eq!(scale, [-100.0, 100.0]);
    }

    #[test]
    fn test_rotation_style_parse() {
        assert_eq!(RotationStyle::parse("don't rotate"), Some(RotationStyle::DontRotate));
        assert_eq!(RotationStyle::parse("sideways"), None);
    }
}

#[cfg(test)]
mod stage_tests {
    use super::*;

    #[test]
    fn test_clone_counter_follows_add_and_dispose() {
        let mut stage = Stage::new(2);
        stage.add_target(Target::sprite("cat", "Cat"));
        let original = stage.get(&cat()).unwrap().clone();
        stage.add_target(original.make_clone(TargetId::from("c1")));
        stage.add_target(original.make_clone(TargetId::from("c2")));
        assert_eq!(stage.clone_count(), 2);
        assert!(!stage.clones_available());

        assert!(stage.dispose_target(&TargetId::from("c1")).is_some());
        assert_eq!(stage.clone_count(), 1);
        assert_eq!(stage.dispose_clones().len(), 1);
        assert_eq!(stage.clone_count(), 0);
        assert_eq!(stage.len(), 1);
    }

    #[test]
    fn test_readding_a_clone_replaces_it() {
        let mut stage = Stage::new(5);
        stage.add_target(Target::sprite("cat", "Cat"));
        let original = stage.get(&cat()).unwrap().clone();
        stage.add_target(original.make_clone(TargetId::from("c1")));
        stage.add_target(original.make_clone(TargetId::from("c1")));
        assert_eq!(stage.clone_count(), 1);
        assert_eq!(stage.len(), 2);

        assert!(stage.dispose_target(&TargetId::from("c1")).is_some());
        assert_eq!(stage.clone_count(), 0);
    }

    #[test]
    fn test_readding_keeps_one_drawable() {
        let (mut stage, renderer) = stage_with_renderer();
        let clone = stage.get(&cat()).unwrap().make_clone(TargetId::from("c1"));
        stage.add_target(clone.clone());
        stage.add_target(clone);
        assert_eq!(renderer.log().lock().drawables.len(), 3);
        assert_eq!(stage.clone_count(), 1);
    }

    #[test]
    fn test_instances_of_includes_clones() {
        let mut stage = Stage::default();
        stage.add_target(Target::sprite("cat", "Cat"));
        stage.add_target(Target::sprite("dog", "Dog"));
        let clone = stage.get(&cat()).unwrap().make_clone(TargetId::from("c1"));
        stage.add_target(clone);

        let instances = stage.instances_of(&cat());
        assert_eq!(instances, vec![cat(), TargetId::from("c1")]);
    }

    #[test]
    fn test_sprite_by_name_skips_clones_and_stage() {
        let mut stage = Stage::default();
        stage.add_target(Target::stage("stage"));
        stage.add_target(Target::sprite("cat", "Cat"));
        assert_eq!(stage.sprite_by_name("Cat").unwrap().id(), &cat());
        assert!(stage.sprite_by_name("Stage").is_none());
        assert!(stage.stage_target().is_some());
    }

    #[test]
    fn test_editing_target() {
        let mut stage = Stage::default();
        stage.add_target(Target::sprite("cat", "Cat"));
        assert!(!stage.set_editing_target(&TargetId::from("dog")));
        assert!(stage.set_editing_target(&cat()));
        assert_eq!(stage.editing_target().unwrap().id(), &cat());
        stage.dispose_target(&cat());
        assert!(stage.editing_target().is_none());
    }

    #[test]
    fn test_stage_target_does_not_move() {
        let mut stage = Stage::default();
        stage.add_target(Target::stage("stage"));
        assert!(!stage.set_xy(&TargetId::from("stage"), 10.0, 10.0, false));
    }
}

#[cfg(test)]
mod renderer_tests {
    use super::*;

    #[test]
    fn test_attach_creates_drawables() {
        let (stage, renderer) = stage_with_renderer();
        let log = renderer.log();
        let log = log.lock();
        assert_eq!(log.drawables.len(), 2);
        let cat_drawable = stage.get(&cat()).unwrap().drawable.unwrap();
        assert_eq!(log.drawable(cat_drawable).unwrap().layer, Layer::Sprite);
    }

    #[test]
    fn test_set_xy_is_fenced_and_forwarded() {
        let (mut stage, renderer) = stage_with_renderer();
        stage.take_redraw_request();
        assert!(stage.set_xy(&cat(), 1000.0, -1000.0, true));

        let target = stage.get(&cat()).unwrap();
        assert_eq!((target.x, target.y), (240.0, -180.0));
        let drawable = target.drawable.unwrap();
        assert_eq!(renderer.log().lock().drawable(drawable).unwrap().position, [240.0, -180.0]);
        assert!(stage.take_redraw_request());
    }

    #[test]
    fn test_hidden_target_does_not_request_redraw() {
        let (mut stage, _renderer) = stage_with_renderer();
        stage.set_visible(&cat(), false);
        stage.take_redraw_request();

        stage.set_xy(&cat(), 5.0, 5.0, false);
        stage.set_size(&cat(), 50.0);
        assert!(!stage.take_redraw_request());
    }

    #[test]
    fn test_direction_wraps() {
        let (mut stage, _renderer) = stage_with_renderer();
        stage.set_direction(&cat(), 450.0);
        assert_eq!(stage.get(&cat()).unwrap().direction, 90.0);
        assert!(!stage.set_direction(&cat(), f64::NAN));
    }

    #[test]
    fn test_size_is_clamped() {
        let (mut stage, _renderer) = stage_with_renderer();
        stage.set_size(&cat(), 1.0);
        assert_eq!(stage.get(&cat()).unwrap().size, MIN_SIZE);
    }

    #[test]
    fn test_effects_are_clamped_and_cleared() {
        let (mut stage, renderer) = stage_with_renderer();
        assert!(stage.set_effect(&cat(), "ghost", 150.0));
        assert!(!stage.set_effect(&cat(), "sparkle", 1.0));
        assert_eq!(stage.get(&cat()).unwrap().effects.get("ghost"), Some(&100.0));

        stage.clear_effects(&cat());
        let drawable = stage.get(&cat()).unwrap().drawable.unwrap();
        assert!(renderer.log().lock().drawable(drawable).unwrap().effects.is_empty());
    }

    #[test]
    fn test_costume_wraps_around() {
        let (mut stage, _renderer) = stage_with_renderer();
        stage.get_mut(&cat()).unwrap().costume_count = 3;
        stage.set_costume(&cat(), 4);
        assert_eq!(stage.get(&cat()).unwrap().costume, 1);
        stage.set_costume(&cat(), -1);
        assert_eq!(stage.get(&cat()).unwrap().costume, 2);
    }

    #[test]
    fn test_empty_bubble_clears() {
        let (mut stage, _renderer) = stage_with_renderer();
        stage.set_bubble(
            &cat(),
            Some(Bubble {
                kind: BubbleKind::Say,
                text: "hi".into(),
            }),
        );
        assert!(stage.get(&cat()).unwrap().bubble.is_some());
        stage.set_bubble(
            &cat(),
            Some(Bubble {
                kind: BubbleKind::Say,
                text: String::new(),
            }),
        );
        assert!(stage.get(&cat()).unwrap().bubble.is_none());
    }

    #[test]
    fn test_stop_all_clears_bubbles_and_effects() {
        let (mut stage, _renderer) = stage_with_renderer();
        stage.set_effect(&cat(), "color", 25.0);
        stage.set_bubble(
            &cat(),
            Some(Bubble {
                kind: BubbleKind::Think,
                text: "hmm".into(),
            }),
        );
        stage.on_stop_all();
        let target = stage.get(&cat()).unwrap();
        assert!(target.bubble.is_none());
        assert!(target.effects.is_empty());
    }

    #[test]
    fn test_dispose_destroys_drawable() {
        let (mut stage, renderer) = stage_with_renderer();
        stage.dispose_target(&cat());
        assert_eq!(renderer.log().lock().drawables.len(), 1);
    }

    #[test]
    fn test_draw_reaches_renderer() {
        let (mut stage, renderer) = stage_with_renderer();
        stage.draw();
        stage.draw();
        assert_eq!(renderer.log().lock().draws, 2);
    }
}

#[cfg(test)]
mod layer_tests {
    use super::*;

    #[test]
    fn test_sprite_cannot_go_behind_backdrop() {
        let (mut stage, renderer) = stage_with_renderer();
        stage.add_target(Target::sprite("dog", "Dog"));

        assert_eq!(stage.set_layer_order(&TargetId::from("dog"), 0, false), Some(1));
        assert_eq!(stage.set_layer_order(&cat(), i32::MAX, false), Some(2));

        let cat_drawable = stage.get(&cat()).unwrap().drawable.unwrap();
        let log = renderer.log();
        let log = log.lock();
        assert_eq!(log.drawables.get_index_of(&cat_drawable), Some(2));
    }

    #[test]
    fn test_layer_order_without_renderer() {
        let mut stage = Stage::default();
        stage.add_target(Target::sprite("cat", "Cat"));
        assert_eq!(stage.set_layer_order(&cat(), 1, true), None);
    }
}
