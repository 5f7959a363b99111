use bevy::prelude::*;

use crate::animation::{goto_and_play, AtlasAnimation};
use crate::assets::AssetState;
use crate::core::{
    Goblin, GoblinSlot, GoblinTier, GroupPurpose, MergeCommitted, RewardEmitter, SessionStats,
    SlotSprites,
};
use crate::drag;
use crate::tween::TweenMarkReached;

pub struct MergePlugin;

impl Plugin for MergePlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<MergeCommitted>()
            .init_resource::<SessionStats>()
            .add_systems(
                Update,
                (
                    handle_converge_marks,
                    drag::register_draggables.run_if(on_event::<MergeCommitted>),
                )
                    .chain()
                    .run_if(in_state(AssetState::Ready)),
            );
    }
}

/// Reacts to converge arrivals. Every arriving goblin stops swinging; under
/// a merge group, the first arrival additionally commits the merge — the
/// latch in the tween group guarantees `first` is true exactly once, so a
/// simultaneous finish cannot upgrade the slot twice.
fn handle_converge_marks(
    mut marks: EventReader<TweenMarkReached>,
    purposes: Query<&GroupPurpose>,
    goblins: Query<&Goblin>,
    mut slots: Query<(&mut GoblinSlot, &SlotSprites), Without<Goblin>>,
    mut sprites: Query<&mut Sprite>,
    mut visibilities: Query<&mut Visibility>,
    mut animations: Query<&mut AtlasAnimation>,
    mut emitters: Query<&mut RewardEmitter>,
    mut committed: EventWriter<MergeCommitted>,
    mut stats: ResMut<SessionStats>,
) {
    for mark in marks.read() {
        let Some(purpose) = mark.group.and_then(|group| purposes.get(group).ok()) else {
            continue;
        };
        let target_slot = match purpose {
            GroupPurpose::Merge { target_slot } => Some(*target_slot),
            GroupPurpose::Unlock => None,
            GroupPurpose::MineIntro | GroupPurpose::Reveal => continue,
        };

        // Arrived: the pickaxe stops mid-swing.
        if let Ok(mut animation) = animations.get_mut(mark.member) {
            animation.playing = false;
        }

        let Some(target_slot) = target_slot else {
            continue;
        };
        if !mark.first {
            continue;
        }

        commit_merge(
            mark.member,
            target_slot,
            &goblins,
            &mut slots,
            &mut sprites,
            &mut visibilities,
            &mut animations,
            &mut emitters,
            &mut committed,
            &mut stats,
        );
    }
}

fn commit_merge(
    loser: Entity,
    target_slot: Entity,
    goblins: &Query<&Goblin>,
    slots: &mut Query<(&mut GoblinSlot, &SlotSprites), Without<Goblin>>,
    sprites: &mut Query<&mut Sprite>,
    visibilities: &mut Query<&mut Visibility>,
    animations: &mut Query<&mut AtlasAnimation>,
    emitters: &mut Query<&mut RewardEmitter>,
    committed: &mut EventWriter<MergeCommitted>,
    stats: &mut SessionStats,
) {
    // The losing slot is consumed, never destroyed; the mine revives it.
    if let Ok(owner) = goblins.get(loser) {
        if let Ok((mut state, _)) = slots.get_mut(owner.slot) {
            state.hidden = true;
        }
    }
    if let Ok(mut emitter) = emitters.get_mut(loser) {
        emitter.active = false;
    }

    let Ok((mut state, slot_sprites)) = slots.get_mut(target_slot) else {
        error!("merge target slot {target_slot} is gone");
        return;
    };

    if state.tier != GoblinTier::Upgraded {
        if let Ok(mut visibility) = visibilities.get_mut(slot_sprites.base) {
            *visibility = Visibility::Hidden;
        }
        if let Ok(mut animation) = animations.get_mut(slot_sprites.base) {
            animation.playing = false;
        }

        if let Ok(mut visibility) = visibilities.get_mut(slot_sprites.upgrade) {
            *visibility = Visibility::Visible;
        }
        if let Ok(mut sprite) = sprites.get_mut(slot_sprites.upgrade) {
            sprite.color.set_alpha(1.0);
            if let Ok(mut animation) = animations.get_mut(slot_sprites.upgrade) {
                goto_and_play(&mut animation, &mut sprite, 0);
            }
        }
        if let Ok(mut emitter) = emitters.get_mut(slot_sprites.upgrade) {
            emitter.active = true;
        }
        state.tier = GoblinTier::Upgraded;
    }

    stats.merges += 1;
    committed.send(MergeCommitted { loser, target_slot });
    info!("merge committed into slot {target_slot}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Draggable;
    use crate::tween::{TweenGroup, TweenMarkReached};

    struct TestSlot {
        slot: Entity,
        base: Entity,
        upgrade: Entity,
    }

    fn spawn_test_slot(app: &mut App, tier: GoblinTier) -> TestSlot {
        let slot = app
            .world_mut()
            .spawn((
                GoblinSlot {
                    tier,
                    hidden: false,
                },
                Transform::default(),
            ))
            .id();
        let base = app
            .world_mut()
            .spawn((
                Sprite::default(),
                Visibility::Visible,
                Transform::default(),
                AtlasAnimation::repeating(8, 12.0),
                tier,
                Goblin { slot },
                RewardEmitter::default(),
            ))
            .id();
        let upgrade = app
            .world_mut()
            .spawn((
                Sprite::default(),
                Visibility::Hidden,
                Transform::default(),
                AtlasAnimation::repeating(8, 12.0),
                GoblinTier::Upgraded,
                Goblin { slot },
                RewardEmitter::default(),
            ))
            .id();
        let ring = app.world_mut().spawn(Transform::default()).id();
        let ore = app.world_mut().spawn(Transform::default()).id();
        app.world_mut().entity_mut(slot).insert(SlotSprites {
            ring,
            ore,
            base,
            upgrade,
        });
        TestSlot {
            slot,
            base,
            upgrade,
        }
    }

    fn test_app() -> App {
        let mut app = App::new();
        app.add_event::<TweenMarkReached>()
            .add_event::<MergeCommitted>()
            .init_resource::<SessionStats>()
            .add_systems(Update, handle_converge_marks);
        app
    }

    #[test]
    fn first_arrival_commits_the_merge() {
        let mut app = test_app();
        let loser = spawn_test_slot(&mut app, GoblinTier::TierA);
        let target = spawn_test_slot(&mut app, GoblinTier::TierA);
        let group = app
            .world_mut()
            .spawn((
                TweenGroup::new(1),
                GroupPurpose::Merge {
                    target_slot: target.slot,
                },
            ))
            .id();

        app.world_mut().send_event(TweenMarkReached {
            group: Some(group),
            member: loser.base,
            first: true,
        });
        app.update();

        let world = app.world();
        let target_state = world.get::<GoblinSlot>(target.slot);
        assert!(
            target_state.is_some_and(|s| s.tier == GoblinTier::Upgraded),
            "the target slot must carry the upgraded tag after a merge"
        );
        assert_eq!(
            world.get::<Visibility>(target.upgrade).copied(),
            Some(Visibility::Visible),
            "the upgraded goblin must be revealed"
        );
        assert!(
            world
                .get::<AtlasAnimation>(target.upgrade)
                .is_some_and(|a| a.playing),
            "the upgraded goblin must be playing"
        );
        assert_eq!(
            world.get::<Visibility>(target.base).copied(),
            Some(Visibility::Hidden),
            "the base goblin steps aside"
        );
        assert!(
            world.get::<GoblinSlot>(loser.slot).is_some_and(|s| s.hidden),
            "the losing slot is flagged hidden, not destroyed"
        );
        assert_eq!(world.resource::<SessionStats>().merges, 1);
    }

    #[test]
    fn later_arrivals_do_not_commit_again() {
        let mut app = test_app();
        let loser_one = spawn_test_slot(&mut app, GoblinTier::TierA);
        let loser_two = spawn_test_slot(&mut app, GoblinTier::TierA);
        let target = spawn_test_slot(&mut app, GoblinTier::TierA);
        let group = app
            .world_mut()
            .spawn((
                TweenGroup::new(2),
                GroupPurpose::Merge {
                    target_slot: target.slot,
                },
            ))
            .id();

        app.world_mut().send_event(TweenMarkReached {
            group: Some(group),
            member: loser_one.base,
            first: true,
        });
        app.world_mut().send_event(TweenMarkReached {
            group: Some(group),
            member: loser_two.base,
            first: false,
        });
        app.update();

        assert_eq!(
            app.world().resource::<SessionStats>().merges,
            1,
            "only the latch winner commits"
        );
        assert!(
            app.world()
                .get::<AtlasAnimation>(loser_two.base)
                .is_some_and(|a| !a.playing),
            "every arrival still stops its animation"
        );
    }

    #[test]
    fn unlock_marks_never_touch_slots() {
        let mut app = test_app();
        let a = spawn_test_slot(&mut app, GoblinTier::TierA);
        let b = spawn_test_slot(&mut app, GoblinTier::TierA);
        let group = app
            .world_mut()
            .spawn((TweenGroup::new(2), GroupPurpose::Unlock))
            .id();

        for member in [a.base, b.base] {
            app.world_mut().send_event(TweenMarkReached {
                group: Some(group),
                member,
                first: member == a.base,
            });
        }
        app.update();

        for slot in [a.slot, b.slot] {
            assert!(
                app.world()
                    .get::<GoblinSlot>(slot)
                    .is_some_and(|s| !s.hidden && s.tier == GoblinTier::TierA),
                "the unlock gesture must not hide or promote any slot"
            );
        }
        assert_eq!(
            app.world().resource::<SessionStats>().merges,
            0,
            "no merge happens before the scene activates"
        );
    }

    #[test]
    fn registration_is_idempotent_after_repeated_merges() {
        let mut app = App::new();
        app.add_systems(Update, drag::register_draggables);
        let slot = spawn_test_slot(&mut app, GoblinTier::Upgraded);

        app.update();
        app.update();

        let world = app.world();
        assert!(
            world.get::<Draggable>(slot.upgrade).is_some(),
            "the upgraded occupant is draggable"
        );
        assert!(
            world.get::<Draggable>(slot.base).is_none(),
            "the benched base form must not keep a drag handler"
        );
    }
}
