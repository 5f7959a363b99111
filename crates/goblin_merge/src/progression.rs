use bevy::prelude::*;
use playable_helpers::input::just_pressed_world_position;

use crate::animation::{goto_and_play, AtlasAnimation, AtlasAnimationFinished};
use crate::assets::AssetState;
use crate::core::{
    Chest, ChestIndex, Draggable, GamePhase, Goblin, GoblinSlot, GroupPurpose, MergeText, Mine,
    MineActivated, MineBody, MineSmoke, OpenChestRequest, RewardEmitter, SlotIndex, SlotSprites,
    StructureRevealed, REVEAL_DURATION,
};
use crate::drag::DragState;
use crate::scene::MINE_POS;
use crate::tween::{
    spawn_group, spawn_seq, Ease, TweenGroupFinished, TweenMarkReached, TweenSeq, TweenStep,
};

/// Tap radius around the mine.
const MINE_TAP_RADIUS: f32 = 70.0;
const MINE_POP_DURATION: f32 = 0.4;
const SHAKE_SEGMENT: f32 = 0.05;

/// Latch: the scene activates at most once per session, no matter how many
/// unlock gestures resolve.
#[derive(Resource, Default)]
pub struct SceneActivated(pub bool);

pub struct ProgressionPlugin;

impl Plugin for ProgressionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SceneActivated>()
            .add_event::<MineActivated>()
            .add_event::<StructureRevealed>()
            .add_systems(
                Update,
                (
                    handle_group_finished,
                    handle_reveal_marks,
                    handle_mine_taps.run_if(in_state(GamePhase::Move)),
                    run_mine_activation,
                    hide_finished_smoke,
                )
                    .run_if(in_state(AssetState::Ready)),
            );
    }
}

/// Which element the mine surfaces next. Chests strictly before slot
/// revival, both in their declared order.
#[derive(Debug, PartialEq, Eq)]
pub enum RevealAction {
    OpenChest(Entity),
    ReviveSlot(Entity),
}

pub fn reveal_pick(
    chests: &[(Entity, bool)],
    hidden_slots: &[(Entity, bool)],
) -> Option<RevealAction> {
    if let Some((chest, _)) = chests.iter().find(|(_, opened)| !opened) {
        return Some(RevealAction::OpenChest(*chest));
    }
    hidden_slots
        .iter()
        .find(|(_, hidden)| *hidden)
        .map(|(slot, _)| RevealAction::ReviveSlot(*slot))
}

fn handle_group_finished(
    mut finished: EventReader<TweenGroupFinished>,
    purposes: Query<&GroupPurpose>,
    mut activated: ResMut<SceneActivated>,
    mut commands: Commands,
    merge_texts: Query<Entity, With<MergeText>>,
    mut mines: Query<(Entity, &mut Visibility, &mut Transform), With<Mine>>,
    mine_bodies: Query<Entity, With<MineBody>>,
    mut sprites: Query<&mut Sprite>,
    mut next_phase: ResMut<NextState<GamePhase>>,
    mut revealed: EventWriter<StructureRevealed>,
    slots: Query<
        (Entity, &GoblinSlot, &SlotSprites, &Transform),
        (Without<Goblin>, Without<Mine>),
    >,
    mut chests: Query<
        (Entity, &mut Visibility, &Transform),
        (With<Chest>, Without<Mine>, Without<GoblinSlot>),
    >,
) {
    for event in finished.read() {
        let Ok(purpose) = purposes.get(event.group) else {
            continue;
        };
        match purpose {
            GroupPurpose::Unlock => {
                if !activated.0 {
                    activated.0 = true;
                    activate_scene(
                        &mut commands,
                        &merge_texts,
                        &mut mines,
                        &mine_bodies,
                        &mut sprites,
                    );
                }
            }
            GroupPurpose::MineIntro => {
                revealed.send(StructureRevealed);
                reveal_scene(&mut commands, &slots, &mut chests, &mut sprites);
                next_phase.set(GamePhase::Move);
            }
            GroupPurpose::Merge { .. } | GroupPurpose::Reveal => {}
        }
        commands.entity(event.group).despawn();
    }
}

/// The mine pops in from nothing with an overshoot, fades up, and gives a
/// short lateral shake; the shake's completion reveals everything else.
fn activate_scene(
    commands: &mut Commands,
    merge_texts: &Query<Entity, With<MergeText>>,
    mines: &mut Query<(Entity, &mut Visibility, &mut Transform), With<Mine>>,
    mine_bodies: &Query<Entity, With<MineBody>>,
    sprites: &mut Query<&mut Sprite>,
) {
    for text in merge_texts {
        spawn_seq(
            commands,
            TweenSeq::new(text, vec![TweenStep::fade(1.0, 0.0, 0.4, Ease::QuadOut)]),
        );
    }

    for (mine, mut visibility, mut transform) in mines {
        *visibility = Visibility::Visible;
        transform.scale = Vec3::splat(0.0);

        spawn_seq(
            commands,
            TweenSeq::new(
                mine,
                vec![TweenStep::scale(
                    Vec2::ZERO,
                    Vec2::ONE,
                    MINE_POP_DURATION,
                    Ease::BackOut,
                )],
            ),
        );

        let intro = spawn_group(commands, 1, GroupPurpose::MineIntro);
        let left = MINE_POS - Vec2::new(5.0, 0.0);
        let right = MINE_POS + Vec2::new(5.0, 0.0);
        spawn_seq(
            commands,
            TweenSeq::new(
                mine,
                vec![
                    TweenStep::hold(MINE_POP_DURATION),
                    TweenStep::translate(MINE_POS, right, SHAKE_SEGMENT, Ease::SineInOut),
                    TweenStep::translate(right, left, SHAKE_SEGMENT, Ease::SineInOut),
                    TweenStep::translate(left, right, SHAKE_SEGMENT, Ease::SineInOut),
                    TweenStep::translate(right, MINE_POS, SHAKE_SEGMENT, Ease::SineInOut),
                ],
            )
            .in_group(intro),
        );
    }

    for body in mine_bodies {
        if let Ok(mut sprite) = sprites.get_mut(body) {
            sprite.color.set_alpha(0.0);
        }
        spawn_seq(
            commands,
            TweenSeq::new(
                body,
                vec![TweenStep::fade(0.0, 1.0, MINE_POP_DURATION, Ease::QuadOut)],
            ),
        );
    }
}

/// Slots and chests fly from the screen center back to their authored
/// spots; each goblin fades in and resumes its swing as it lands.
fn reveal_scene(
    commands: &mut Commands,
    slots: &Query<
        (Entity, &GoblinSlot, &SlotSprites, &Transform),
        (Without<Goblin>, Without<Mine>),
    >,
    chests: &mut Query<
        (Entity, &mut Visibility, &Transform),
        (With<Chest>, Without<Mine>, Without<GoblinSlot>),
    >,
    sprites: &mut Query<&mut Sprite>,
) {
    let members = slots.iter().count() + chests.iter().count();
    let group = spawn_group(commands, members, GroupPurpose::Reveal);

    for (slot, state, slot_sprites, transform) in slots {
        let authored = transform.translation.truncate();
        if let Ok(mut sprite) = sprites.get_mut(slot_sprites.occupant(state.tier)) {
            sprite.color.set_alpha(0.0);
        }
        spawn_seq(
            commands,
            TweenSeq::new(
                slot,
                vec![TweenStep::translate(
                    Vec2::ZERO,
                    authored,
                    REVEAL_DURATION,
                    Ease::BackOut,
                )],
            )
            .in_group(group)
            .with_mark(0),
        );
    }

    for (chest, mut visibility, transform) in chests {
        *visibility = Visibility::Visible;
        let authored = transform.translation.truncate();
        spawn_seq(
            commands,
            TweenSeq::new(
                chest,
                vec![TweenStep::translate(
                    Vec2::ZERO,
                    authored,
                    REVEAL_DURATION,
                    Ease::BackOut,
                )],
            )
            .in_group(group),
        );
    }
}

/// Reveal marks are the only marks whose member is a slot container
/// (converge marks land on goblins, the intro on the mine), so the member
/// type identifies them without touching the group, which may already be
/// torn down in the same tick.
fn handle_reveal_marks(
    mut marks: EventReader<TweenMarkReached>,
    slots: Query<(&GoblinSlot, &SlotSprites)>,
    mut sprites: Query<&mut Sprite>,
    mut animations: Query<&mut AtlasAnimation>,
    mut emitters: Query<&mut RewardEmitter>,
) {
    for mark in marks.read() {
        let Ok((state, slot_sprites)) = slots.get(mark.member) else {
            continue;
        };
        let occupant = slot_sprites.occupant(state.tier);
        if let Ok(mut sprite) = sprites.get_mut(occupant) {
            sprite.color.set_alpha(1.0);
        }
        if let Ok(mut animation) = animations.get_mut(occupant) {
            animation.playing = true;
        }
        if let Ok(mut emitter) = emitters.get_mut(occupant) {
            emitter.active = true;
        }
    }
}

fn handle_mine_taps(
    mouse_input: Res<ButtonInput<MouseButton>>,
    touch_input: Res<Touches>,
    windows: Query<&Window>,
    camera: Query<(&Camera, &GlobalTransform)>,
    drag: Res<DragState>,
    mines: Query<&Transform, With<Mine>>,
    mut taps: EventWriter<MineActivated>,
) {
    if drag.0.is_some() {
        return;
    }
    let Some(pointer) = just_pressed_world_position(&mouse_input, &touch_input, &windows, &camera)
    else {
        return;
    };
    for transform in &mines {
        if transform.translation.truncate().distance(pointer) < MINE_TAP_RADIUS {
            taps.send(MineActivated);
        }
    }
}

fn run_mine_activation(
    mut events: EventReader<MineActivated>,
    mut commands: Commands,
    mines: Query<Entity, With<Mine>>,
    mut smokes: Query<(&mut Visibility, &mut Sprite, &mut AtlasAnimation), With<MineSmoke>>,
    chests: Query<(Entity, &Chest, &ChestIndex)>,
    mut slots: Query<(Entity, &mut GoblinSlot, &SlotSprites, &SlotIndex), Without<Goblin>>,
    mut sprites: Query<&mut Sprite, Without<MineSmoke>>,
    mut visibilities: Query<&mut Visibility, Without<MineSmoke>>,
    mut animations: Query<&mut AtlasAnimation, Without<MineSmoke>>,
    mut emitters: Query<&mut RewardEmitter>,
    mut open_requests: EventWriter<OpenChestRequest>,
) {
    for _ in events.read() {
        for (mut visibility, mut sprite, mut animation) in &mut smokes {
            *visibility = Visibility::Visible;
            goto_and_play(&mut animation, &mut sprite, 0);
        }
        for mine in &mines {
            spawn_seq(
                &mut commands,
                TweenSeq::new(
                    mine,
                    vec![
                        TweenStep::scale(Vec2::ONE, Vec2::new(1.1, 0.9), 0.05, Ease::SineInOut),
                        TweenStep::scale(Vec2::new(1.1, 0.9), Vec2::ONE, 0.05, Ease::SineInOut),
                        TweenStep::scale(Vec2::ONE, Vec2::new(1.1, 0.9), 0.05, Ease::SineInOut),
                        TweenStep::scale(Vec2::new(1.1, 0.9), Vec2::ONE, 0.05, Ease::SineInOut),
                    ],
                ),
            );
        }

        let mut chest_list: Vec<_> = chests.iter().collect();
        chest_list.sort_by_key(|(_, _, index)| index.0);
        let chest_flags: Vec<(Entity, bool)> = chest_list
            .iter()
            .map(|(entity, chest, _)| (*entity, chest.opened))
            .collect();

        let mut slot_list: Vec<_> = slots.iter().collect();
        slot_list.sort_by_key(|(_, _, _, index)| index.0);
        let slot_flags: Vec<(Entity, bool)> = slot_list
            .iter()
            .map(|(entity, state, _, _)| (*entity, state.hidden))
            .collect();

        match reveal_pick(&chest_flags, &slot_flags) {
            Some(RevealAction::OpenChest(chest)) => {
                open_requests.send(OpenChestRequest { chest });
            }
            Some(RevealAction::ReviveSlot(slot)) => {
                let Ok((_, mut state, slot_sprites, _)) = slots.get_mut(slot) else {
                    continue;
                };
                state.hidden = false;
                let occupant = slot_sprites.occupant(state.tier);
                if let Ok(mut sprite) = sprites.get_mut(occupant) {
                    sprite.color.set_alpha(1.0);
                }
                if let Ok(mut visibility) = visibilities.get_mut(occupant) {
                    *visibility = Visibility::Visible;
                }
                if let Ok(mut animation) = animations.get_mut(occupant) {
                    animation.playing = true;
                }
                if let Ok(mut emitter) = emitters.get_mut(occupant) {
                    emitter.active = true;
                }
                commands.entity(occupant).insert(Draggable);
            }
            None => {}
        }
    }
}

fn hide_finished_smoke(
    mut finished: EventReader<AtlasAnimationFinished>,
    mut smokes: Query<&mut Visibility, With<MineSmoke>>,
) {
    for event in finished.read() {
        if let Ok(mut visibility) = smokes.get_mut(event.entity) {
            *visibility = Visibility::Hidden;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tween::TweenGroup;

    #[test]
    fn chests_open_before_slots_revive_in_declared_order() {
        let c1 = Entity::from_raw(1);
        let c2 = Entity::from_raw(2);
        let s1 = Entity::from_raw(3);

        // Tap 1: the first unopened chest, even though a slot is hidden.
        let pick = reveal_pick(&[(c1, false), (c2, false)], &[(s1, true)]);
        assert_eq!(pick, Some(RevealAction::OpenChest(c1)));

        // Tap 2: the next chest in declared order.
        let pick = reveal_pick(&[(c1, true), (c2, false)], &[(s1, true)]);
        assert_eq!(pick, Some(RevealAction::OpenChest(c2)));

        // Tap 3: only now does the hidden slot revive.
        let pick = reveal_pick(&[(c1, true), (c2, true)], &[(s1, true)]);
        assert_eq!(pick, Some(RevealAction::ReviveSlot(s1)));

        // Nothing left to surface.
        let pick = reveal_pick(&[(c1, true), (c2, true)], &[(s1, false)]);
        assert_eq!(pick, None);
    }

    #[test]
    fn activation_happens_exactly_once() {
        let mut app = App::new();
        app.add_plugins(bevy::state::app::StatesPlugin)
            .init_state::<GamePhase>()
            .init_resource::<SceneActivated>()
            .add_event::<TweenGroupFinished>()
            .add_event::<TweenMarkReached>()
            .add_event::<StructureRevealed>()
            .add_systems(Update, handle_group_finished);

        app.world_mut().spawn((
            MergeText,
            TextColor(Color::WHITE),
            Transform::default(),
        ));
        app.world_mut().spawn((
            Mine,
            Visibility::Hidden,
            Transform::from_translation(MINE_POS.extend(4.0)),
        ));

        // A repeated unlock gesture produces a second finished group.
        for _ in 0..2 {
            let group = app
                .world_mut()
                .spawn((TweenGroup::new(0), GroupPurpose::Unlock))
                .id();
            app.world_mut()
                .send_event(TweenGroupFinished { group });
        }
        app.update();

        assert!(app.world().resource::<SceneActivated>().0);
        let intro_groups = app
            .world_mut()
            .query::<&GroupPurpose>()
            .iter(app.world())
            .filter(|purpose| matches!(purpose, GroupPurpose::MineIntro))
            .count();
        assert_eq!(
            intro_groups, 1,
            "two unlock gestures must still produce a single mine entrance"
        );
    }

    #[test]
    fn mine_intro_completion_reveals_and_unlocks_merging() {
        let mut app = App::new();
        app.add_plugins(bevy::state::app::StatesPlugin)
            .init_state::<GamePhase>()
            .init_resource::<SceneActivated>()
            .add_event::<TweenGroupFinished>()
            .add_event::<TweenMarkReached>()
            .add_event::<StructureRevealed>()
            .add_systems(Update, handle_group_finished);

        let group = app
            .world_mut()
            .spawn((TweenGroup::new(0), GroupPurpose::MineIntro))
            .id();
        app.world_mut().send_event(TweenGroupFinished { group });
        app.update();

        let revealed = !app
            .world()
            .resource::<Events<StructureRevealed>>()
            .is_empty();
        assert!(revealed, "the build beat fires when the mine settles");

        // The phase request flips to Move; it is applied on state
        // transition, so inspect the pending queue.
        let next = app.world().resource::<NextState<GamePhase>>();
        assert!(
            matches!(next, NextState::Pending(GamePhase::Move)),
            "merging unlocks when the reveal choreography starts"
        );
    }
}
