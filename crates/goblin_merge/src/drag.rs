use bevy::prelude::*;
use playable_helpers::input::{
    any_just_released, just_pressed_world_position, pressed_world_position,
};

use crate::animation::AtlasAnimation;
use crate::assets::AssetState;
use crate::core::{
    Draggable, GamePhase, Goblin, GoblinSlot, GroupPurpose, RewardEmitter, SlotIndex, SlotSprites,
    CONVERGE_DURATION, CONVERGE_FADE_DURATION, GRAB_RADIUS, RETURN_DURATION, SNAP_RADIUS,
};
use crate::scene::Z_SLOT_RAISED;
use crate::tween::{spawn_group, spawn_seq, Ease, TweenSeq, TweenStep};

/// At most one goblin is dragged at a time.
#[derive(Resource, Default)]
pub struct DragState(pub Option<Dragging>);

pub struct Dragging {
    pub goblin: Entity,
    pub slot: Entity,
    /// Pointer-to-goblin offset captured on press, in world units.
    pub grab_offset: Vec2,
    /// Local position to return to on a failed drop.
    pub original_local: Vec2,
}

/// Raised once per completed press-release gesture. The drag flag is taken
/// before this is sent, so a duplicate release event cannot double-fire.
#[derive(Event)]
pub struct DropReleased {
    pub goblin: Entity,
    pub slot: Entity,
    pub original_local: Vec2,
}

pub struct DragPlugin;

impl Plugin for DragPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DragState>()
            .add_event::<DropReleased>()
            .add_systems(
                Update,
                (begin_drag, update_drag, end_drag, resolve_drop)
                    .chain()
                    .run_if(in_state(AssetState::Ready)),
            );
    }
}

/// Makes the current occupant of every live slot draggable, and benches the
/// other form. Safe to run repeatedly: the marker is inserted, not stacked,
/// so re-registration after a merge cannot produce duplicate drop handling.
pub fn register_draggables(
    mut commands: Commands,
    slots: Query<(&GoblinSlot, &SlotSprites)>,
) {
    for (slot, sprites) in &slots {
        let occupant = sprites.occupant(slot.tier);
        let benched = if occupant == sprites.base {
            sprites.upgrade
        } else {
            sprites.base
        };
        commands.entity(occupant).insert(Draggable);
        commands.entity(benched).remove::<Draggable>();
    }
}

/// Nearest candidate strictly inside `max_dist`. Ties keep the earliest
/// entry, so candidate iteration order is the tie-break.
pub fn closest_within(origin: Vec2, candidates: &[(Entity, Vec2)], max_dist: f32) -> Option<Entity> {
    let mut best = None;
    let mut best_dist = max_dist;
    for (entity, position) in candidates {
        let distance = origin.distance(*position);
        if distance < best_dist {
            best_dist = distance;
            best = Some(*entity);
        }
    }
    best
}

fn set_ring_scale(
    commands: &mut Commands,
    drivers: &Query<(Entity, &TweenSeq)>,
    ring: Entity,
    show: bool,
) {
    crate::tween::kill_tweens_for(commands, drivers, ring);
    let (from, to) = if show {
        (Vec2::ZERO, Vec2::splat(2.0))
    } else {
        (Vec2::splat(2.0), Vec2::ZERO)
    };
    spawn_seq(
        commands,
        TweenSeq::new(ring, vec![TweenStep::scale(from, to, 0.1, Ease::QuadOut)]),
    );
}

fn begin_drag(
    mouse_input: Res<ButtonInput<MouseButton>>,
    touch_input: Res<Touches>,
    windows: Query<&Window>,
    camera: Query<(&Camera, &GlobalTransform)>,
    phase: Res<State<GamePhase>>,
    mut drag: ResMut<DragState>,
    goblins: Query<(Entity, &Goblin, &Transform, &InheritedVisibility), With<Draggable>>,
    mut slots: Query<
        (Entity, &GoblinSlot, &SlotSprites, &SlotIndex, &mut Transform),
        Without<Goblin>,
    >,
    mut animations: Query<&mut AtlasAnimation>,
    mut emitters: Query<&mut RewardEmitter>,
    drivers: Query<(Entity, &TweenSeq)>,
    mut commands: Commands,
) {
    if *phase.get() == GamePhase::Finished || drag.0.is_some() {
        return;
    }
    let Some(pointer) = just_pressed_world_position(&mouse_input, &touch_input, &windows, &camera)
    else {
        return;
    };

    // Pick the closest visible goblin under the pointer.
    let mut grabbed: Option<(Entity, Entity, Vec2, Vec2)> = None;
    let mut grabbed_dist = GRAB_RADIUS;
    for (goblin, owner, transform, visibility) in &goblins {
        if !visibility.get() {
            continue;
        }
        let Ok((_, slot_state, _, _, slot_transform)) = slots.get(owner.slot) else {
            continue;
        };
        if slot_state.hidden {
            continue;
        }
        let world = slot_transform.translation.truncate() + transform.translation.truncate();
        let distance = world.distance(pointer);
        if distance < grabbed_dist {
            grabbed_dist = distance;
            grabbed = Some((goblin, owner.slot, world, transform.translation.truncate()));
        }
    }
    let Some((goblin, slot, world, original_local)) = grabbed else {
        return;
    };

    drag.0 = Some(Dragging {
        goblin,
        slot,
        grab_offset: world - pointer,
        original_local,
    });

    // Raise the grabbed slot above its siblings while it travels.
    let grabbed_tier = slots.get(slot).map(|(_, state, _, _, _)| state.tier).ok();
    for (entity, _, _, index, mut transform) in &mut slots {
        transform.translation.z = if entity == slot {
            Z_SLOT_RAISED
        } else {
            crate::scene::Z_SLOT_BASE + index.0 as f32 * 0.1
        };
    }

    // Highlight where this goblin could land.
    for (entity, state, sprites, _, _) in &slots {
        let eligible = entity != slot && !state.hidden && Some(state.tier) == grabbed_tier;
        set_ring_scale(&mut commands, &drivers, sprites.ring, eligible);
    }

    if let Ok(mut animation) = animations.get_mut(goblin) {
        animation.playing = false;
    }
    if let Ok(mut emitter) = emitters.get_mut(goblin) {
        emitter.active = false;
    }
}

fn update_drag(
    mouse_input: Res<ButtonInput<MouseButton>>,
    touch_input: Res<Touches>,
    windows: Query<&Window>,
    camera: Query<(&Camera, &GlobalTransform)>,
    drag: Res<DragState>,
    slots: Query<&Transform, (With<GoblinSlot>, Without<Goblin>)>,
    mut goblins: Query<&mut Transform, With<Goblin>>,
) {
    let Some(dragging) = &drag.0 else {
        return;
    };
    let Some(pointer) = pressed_world_position(&mouse_input, &touch_input, &windows, &camera)
    else {
        return;
    };
    // The slot can be gone if the scene is torn down mid-drag; no-op then.
    let Ok(slot_transform) = slots.get(dragging.slot) else {
        return;
    };
    let Ok(mut transform) = goblins.get_mut(dragging.goblin) else {
        return;
    };

    // Direct, unsmoothed tracking: this is the one update that must stay
    // synchronous with the pointer.
    let local = pointer + dragging.grab_offset - slot_transform.translation.truncate();
    transform.translation.x = local.x;
    transform.translation.y = local.y;
}

fn end_drag(
    mouse_input: Res<ButtonInput<MouseButton>>,
    touch_input: Res<Touches>,
    mut drag: ResMut<DragState>,
    mut drops: EventWriter<DropReleased>,
) {
    if !any_just_released(&mouse_input, &touch_input) {
        return;
    }
    let Some(dragging) = drag.0.take() else {
        return;
    };
    drops.send(DropReleased {
        goblin: dragging.goblin,
        slot: dragging.slot,
        original_local: dragging.original_local,
    });
}

struct Candidate {
    slot: Entity,
    occupant: Entity,
    world: Vec2,
}

fn resolve_drop(
    mut drops: EventReader<DropReleased>,
    phase: Res<State<GamePhase>>,
    mut slots: Query<
        (Entity, &mut GoblinSlot, &SlotSprites, &SlotIndex, &Transform),
        Without<Goblin>,
    >,
    goblins: Query<(&Transform, &InheritedVisibility), With<Goblin>>,
    mut animations: Query<&mut AtlasAnimation>,
    mut emitters: Query<&mut RewardEmitter>,
    drivers: Query<(Entity, &TweenSeq)>,
    mut commands: Commands,
) {
    for drop in drops.read() {
        let Ok((_, drag_slot, _, _, drag_slot_transform)) = slots.get(drop.slot) else {
            continue;
        };
        let tier = drag_slot.tier;
        let drag_slot_pos = drag_slot_transform.translation.truncate();

        let dragged_world = goblins.get(drop.goblin).map_or(drag_slot_pos, |(t, _)| {
            drag_slot_pos + t.translation.truncate()
        });

        // Same-tier occupants of live slots, in slot order.
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut ordered: Vec<_> = slots.iter().collect();
        ordered.sort_by_key(|(_, _, _, index, _)| index.0);
        for (entity, state, sprites, _, transform) in &ordered {
            if *entity == drop.slot || state.hidden || state.tier != tier {
                continue;
            }
            let occupant = sprites.occupant(state.tier);
            let Ok((occupant_transform, visibility)) = goblins.get(occupant) else {
                continue;
            };
            if !visibility.get() {
                continue;
            }
            candidates.push(Candidate {
                slot: *entity,
                occupant,
                world: transform.translation.truncate()
                    + occupant_transform.translation.truncate(),
            });
        }

        let positions: Vec<(Entity, Vec2)> =
            candidates.iter().map(|c| (c.occupant, c.world)).collect();
        let chosen = closest_within(dragged_world, &positions, SNAP_RADIUS)
            .and_then(|occupant| candidates.iter().find(|c| c.occupant == occupant));

        match chosen {
            None => {
                // Snap back; idle playback resumes immediately, alongside
                // the tween rather than after it.
                if let Ok(mut animation) = animations.get_mut(drop.goblin) {
                    animation.playing = true;
                }
                if *phase.get() == GamePhase::Move {
                    if let Ok(mut emitter) = emitters.get_mut(drop.goblin) {
                        emitter.active = true;
                    }
                }
                let current = goblins
                    .get(drop.goblin)
                    .map_or(drop.original_local, |(t, _)| t.translation.truncate());
                spawn_seq(
                    &mut commands,
                    TweenSeq::new(
                        drop.goblin,
                        vec![TweenStep::translate(
                            current,
                            drop.original_local,
                            RETURN_DURATION,
                            Ease::QuadOut,
                        )],
                    ),
                );
            }
            Some(target) => match phase.get() {
                GamePhase::Start => {
                    // The unlock gesture: every same-tier goblin converges
                    // on the screen center, the scene activates when the
                    // whole flock has settled.
                    let mut members: Vec<(Entity, Entity, Vec2)> = vec![(
                        drop.goblin,
                        drop.slot,
                        drop.original_local,
                    )];
                    for candidate in &candidates {
                        let original = goblins
                            .get(candidate.occupant)
                            .map_or(Vec2::ZERO, |(t, _)| t.translation.truncate());
                        members.push((candidate.occupant, candidate.slot, original));
                    }
                    let group =
                        spawn_group(&mut commands, members.len(), GroupPurpose::Unlock);
                    spawn_converge(
                        &mut commands,
                        group,
                        &members,
                        Vec2::ZERO,
                        &slots,
                        &goblins,
                        &mut animations,
                        drop,
                    );
                }
                GamePhase::Move => {
                    // Merge gesture: everyone but the chosen slot flies in;
                    // the first arrival commits the merge.
                    let mut members: Vec<(Entity, Entity, Vec2)> = vec![(
                        drop.goblin,
                        drop.slot,
                        drop.original_local,
                    )];
                    for candidate in &candidates {
                        if candidate.slot == target.slot {
                            continue;
                        }
                        let original = goblins
                            .get(candidate.occupant)
                            .map_or(Vec2::ZERO, |(t, _)| t.translation.truncate());
                        members.push((candidate.occupant, candidate.slot, original));
                    }
                    // Losing slots are consumed up front; the mine can
                    // revive them later.
                    for (member_goblin, member_slot, _) in &members {
                        if let Ok((_, mut state, _, _, _)) = slots.get_mut(*member_slot) {
                            state.hidden = true;
                        }
                        if let Ok(mut emitter) = emitters.get_mut(*member_goblin) {
                            emitter.active = false;
                        }
                    }
                    let group = spawn_group(
                        &mut commands,
                        members.len(),
                        GroupPurpose::Merge {
                            target_slot: target.slot,
                        },
                    );
                    spawn_converge(
                        &mut commands,
                        group,
                        &members,
                        target.world,
                        &slots,
                        &goblins,
                        &mut animations,
                        drop,
                    );
                }
                GamePhase::Finished => {}
            },
        }

        // Whatever happened, the highlight rings go away.
        for (_, _, sprites, _, _) in &slots {
            set_ring_scale(&mut commands, &drivers, sprites.ring, false);
        }
    }
}

/// Spawns one converge sequence per member: fly to the shared point, fade
/// out, then glide back (invisible) to the original local position. Step 0
/// is marked so listeners can react to each arrival.
fn spawn_converge(
    commands: &mut Commands,
    group: Entity,
    members: &[(Entity, Entity, Vec2)],
    point_world: Vec2,
    slots: &Query<
        (Entity, &mut GoblinSlot, &SlotSprites, &SlotIndex, &Transform),
        Without<Goblin>,
    >,
    goblins: &Query<(&Transform, &InheritedVisibility), With<Goblin>>,
    animations: &mut Query<&mut AtlasAnimation>,
    drop: &DropReleased,
) {
    for (goblin, slot, original_local) in members {
        let Ok((_, _, _, _, slot_transform)) = slots.get(*slot) else {
            continue;
        };
        let point_local = point_world - slot_transform.translation.truncate();
        let current_local = if *goblin == drop.goblin {
            goblins
                .get(*goblin)
                .map_or(*original_local, |(t, _)| t.translation.truncate())
        } else {
            *original_local
        };

        // They swing their pickaxes while flying.
        if let Ok(mut animation) = animations.get_mut(*goblin) {
            animation.playing = true;
        }

        let seq = TweenSeq::new(
            *goblin,
            vec![
                TweenStep::translate(current_local, point_local, CONVERGE_DURATION, Ease::QuadOut),
                TweenStep::fade(1.0, 0.0, CONVERGE_FADE_DURATION, Ease::QuadOut),
                TweenStep::translate(point_local, *original_local, RETURN_DURATION, Ease::Linear),
            ],
        )
        .in_group(group)
        .with_mark(0);
        spawn_seq(commands, seq);
    }
}
