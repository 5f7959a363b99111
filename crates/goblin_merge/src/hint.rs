use bevy::prelude::*;

use crate::assets::{AssetState, GameAssets};
use crate::core::{
    Chest, GamePhase, Goblin, GoblinSlot, SlotIndex, SlotSprites, HINT_IDLE_DELAY,
};
use crate::scene::{MINE_POS, Z_HINT};
use crate::tween::{kill_tweens_for, spawn_seq, Ease, TweenSeq, TweenStep};

const FINGER_OFFSET: Vec2 = Vec2::new(24.0, -24.0);
const GHOST_ALPHA: f32 = 0.7;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HintKind {
    /// Ghost goblin plus finger gliding from one slot to another.
    DragMerge,
    /// Finger pulsing over an unopened chest.
    TapChest,
    /// Finger pulsing over the mine.
    TapMine,
}

/// Marker on every ephemeral hint entity, so teardown is a query away.
#[derive(Component)]
pub struct HintNode;

struct ActiveHint {
    kind: HintKind,
    nodes: Vec<Entity>,
}

/// At most one hint session exists at a time. Starting a new session tears
/// the previous one down first, so hint nodes can never pile up.
#[derive(Resource, Default)]
pub struct HintSession {
    active: Option<ActiveHint>,
}

/// Counts quiet time; any real pointer press resets it.
#[derive(Resource)]
pub struct HintIdle(pub Timer);

impl Default for HintIdle {
    fn default() -> Self {
        Self(Timer::from_seconds(HINT_IDLE_DELAY, TimerMode::Once))
    }
}

pub struct HintPlugin;

impl Plugin for HintPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<HintSession>()
            .init_resource::<HintIdle>()
            .add_systems(
                Update,
                (cancel_on_press, schedule_hints)
                    .chain()
                    .run_if(in_state(AssetState::Ready).and(not(in_state(GamePhase::Finished)))),
            )
            .add_systems(OnEnter(GamePhase::Move), cancel_session_system)
            .add_systems(OnEnter(GamePhase::Finished), cancel_session_system);
    }
}

fn cancel_session(
    commands: &mut Commands,
    drivers: &Query<(Entity, &TweenSeq)>,
    session: &mut HintSession,
) {
    let Some(active) = session.active.take() else {
        return;
    };
    debug!("hint session ({:?}) cancelled", active.kind);
    for node in active.nodes {
        kill_tweens_for(commands, drivers, node);
        commands.entity(node).despawn();
    }
}

fn cancel_session_system(
    mut commands: Commands,
    drivers: Query<(Entity, &TweenSeq)>,
    mut session: ResMut<HintSession>,
) {
    cancel_session(&mut commands, &drivers, &mut session);
}

/// The first real pointer-down anywhere cancels the running hint and
/// restarts the idle clock.
fn cancel_on_press(
    mouse_input: Res<ButtonInput<MouseButton>>,
    touch_input: Res<Touches>,
    mut idle: ResMut<HintIdle>,
    mut session: ResMut<HintSession>,
    drivers: Query<(Entity, &TweenSeq)>,
    mut commands: Commands,
) {
    if !mouse_input.just_pressed(MouseButton::Left) && !touch_input.any_just_pressed() {
        return;
    }
    idle.0.reset();
    cancel_session(&mut commands, &drivers, &mut session);
}

fn schedule_hints(
    time: Res<Time>,
    mut idle: ResMut<HintIdle>,
    mut session: ResMut<HintSession>,
    phase: Res<State<GamePhase>>,
    slots: Query<(Entity, &GoblinSlot, &SlotSprites, &SlotIndex, &Transform), Without<Goblin>>,
    goblin_visibility: Query<&InheritedVisibility, With<Goblin>>,
    sprites: Query<&Sprite>,
    chests: Query<(&Chest, &Transform, &Visibility), Without<GoblinSlot>>,
    assets: Res<GameAssets>,
    drivers: Query<(Entity, &TweenSeq)>,
    mut commands: Commands,
) {
    idle.0.tick(time.delta());
    if !idle.0.finished() || session.active.is_some() {
        return;
    }
    // Defensive teardown before constructing new nodes; a session slipping
    // past the guard above must never leave two loops running.
    cancel_session(&mut commands, &drivers, &mut session);

    let kind = match phase.get() {
        GamePhase::Start => Some(HintKind::DragMerge),
        GamePhase::Move => {
            let unopened_visible = chests
                .iter()
                .find(|(chest, _, visibility)| !chest.opened && **visibility != Visibility::Hidden);
            if let Some((_, transform, _)) = unopened_visible {
                start_tap_hint(
                    &mut commands,
                    &assets,
                    &mut session,
                    HintKind::TapChest,
                    transform.translation.truncate(),
                );
                return;
            }
            let any_hidden = slots.iter().any(|(_, state, _, _, _)| state.hidden);
            if any_hidden {
                start_tap_hint(
                    &mut commands,
                    &assets,
                    &mut session,
                    HintKind::TapMine,
                    MINE_POS,
                );
                return;
            }
            Some(HintKind::DragMerge)
        }
        GamePhase::Finished => None,
    };
    if kind != Some(HintKind::DragMerge) {
        return;
    }

    // Teach the drag: pick the first same-tier pair of live slots.
    let mut ordered: Vec<_> = slots.iter().collect();
    ordered.sort_by_key(|(_, _, _, index, _)| index.0);
    let live: Vec<(&GoblinSlot, &SlotSprites, &Transform)> = ordered
        .iter()
        .filter(|(_, state, slot_sprites, _, _)| {
            !state.hidden
                && goblin_visibility
                    .get(slot_sprites.occupant(state.tier))
                    .is_ok_and(|visibility| visibility.get())
        })
        .map(|(_, state, slot_sprites, _, transform)| (*state, *slot_sprites, *transform))
        .collect();

    let mut pair = None;
    'search: for (i, first) in live.iter().enumerate() {
        for second in live.iter().skip(i + 1) {
            if second.0.tier == first.0.tier {
                pair = Some((*first, *second));
                break 'search;
            }
        }
    }
    let Some((source, destination)) = pair else {
        return;
    };

    let (source_state, source_sprites, source_transform) = source;
    let (_, _, destination_transform) = destination;
    let from = source_transform.translation.truncate();
    let to = destination_transform.translation.truncate();

    // Ghost copy of the goblin being "dragged".
    let mut ghost_sprite = sprites
        .get(source_sprites.occupant(source_state.tier))
        .cloned()
        .unwrap_or_default();
    ghost_sprite.color.set_alpha(GHOST_ALPHA);
    let ghost = commands
        .spawn((
            ghost_sprite,
            Transform::from_translation(from.extend(Z_HINT - 0.5)),
            HintNode,
        ))
        .id();
    spawn_seq(
        &mut commands,
        TweenSeq::looping(
            ghost,
            vec![
                TweenStep::fade(GHOST_ALPHA, GHOST_ALPHA, 0.0, Ease::Linear),
                TweenStep::translate(from, to, 1.0, Ease::QuadInOut),
                TweenStep::fade(GHOST_ALPHA, 0.0, 0.4, Ease::QuadOut),
                TweenStep::hold(0.4),
            ],
        ),
    );

    let finger = commands
        .spawn((
            Sprite::from_image(assets.hand.clone()),
            Transform::from_translation((from + FINGER_OFFSET).extend(Z_HINT)),
            HintNode,
        ))
        .id();
    spawn_seq(
        &mut commands,
        TweenSeq::looping(
            finger,
            vec![
                TweenStep::fade(1.0, 1.0, 0.0, Ease::Linear),
                TweenStep::translate(from + FINGER_OFFSET, to + FINGER_OFFSET, 1.0, Ease::QuadInOut),
                TweenStep::fade(1.0, 0.0, 0.4, Ease::QuadOut),
                TweenStep::hold(0.4),
            ],
        ),
    );

    session.active = Some(ActiveHint {
        kind: HintKind::DragMerge,
        nodes: vec![ghost, finger],
    });
}

fn start_tap_hint(
    commands: &mut Commands,
    assets: &GameAssets,
    session: &mut HintSession,
    kind: HintKind,
    position: Vec2,
) {
    let finger = commands
        .spawn((
            Sprite::from_image(assets.hand.clone()),
            Transform::from_translation((position + FINGER_OFFSET).extend(Z_HINT)),
            HintNode,
        ))
        .id();
    spawn_seq(
        commands,
        TweenSeq::looping(
            finger,
            vec![
                TweenStep::scale(Vec2::ONE, Vec2::splat(1.25), 0.4, Ease::SineInOut),
                TweenStep::scale(Vec2::splat(1.25), Vec2::ONE, 0.4, Ease::SineInOut),
                TweenStep::hold(0.2),
            ],
        ),
    );
    session.active = Some(ActiveHint {
        kind,
        nodes: vec![finger],
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GoblinTier, RewardEmitter};
    use crate::animation::AtlasAnimation;
    use std::time::Duration;

    fn dummy_assets() -> GameAssets {
        GameAssets {
            background: Handle::default(),
            goblin_sheet: Handle::default(),
            smoke_sheet: Handle::default(),
            mine: Handle::default(),
            ore_copper: Handle::default(),
            ore_iron: Handle::default(),
            coin: Handle::default(),
            gem: Handle::default(),
            potion: Handle::default(),
            shine: Handle::default(),
            chest_wood_closed: Handle::default(),
            chest_wood_open: Handle::default(),
            chest_iron_closed: Handle::default(),
            chest_iron_open: Handle::default(),
            chest_gold_closed: Handle::default(),
            chest_gold_open: Handle::default(),
            hand: Handle::default(),
            logo: Handle::default(),
            cta: Handle::default(),
            install_button: Handle::default(),
            free_badge: Handle::default(),
        }
    }

    fn spawn_slot_with_goblin(app: &mut App, index: usize, position: Vec2) {
        let slot = app
            .world_mut()
            .spawn((
                GoblinSlot {
                    tier: GoblinTier::TierA,
                    hidden: false,
                },
                SlotIndex(index),
                Transform::from_translation(position.extend(10.0)),
            ))
            .id();
        let base = app
            .world_mut()
            .spawn((
                Sprite::default(),
                Transform::default(),
                InheritedVisibility::VISIBLE,
                AtlasAnimation::repeating(8, 12.0),
                GoblinTier::TierA,
                Goblin { slot },
                RewardEmitter::default(),
            ))
            .id();
        let upgrade = app
            .world_mut()
            .spawn((
                Sprite::default(),
                Transform::default(),
                InheritedVisibility::HIDDEN,
                GoblinTier::Upgraded,
                Goblin { slot },
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
    }

    fn hint_app() -> App {
        let mut app = App::new();
        app.add_plugins(bevy::state::app::StatesPlugin)
            .init_state::<GamePhase>()
            .init_resource::<Time>()
            .init_resource::<HintSession>()
            .init_resource::<HintIdle>()
            .init_resource::<ButtonInput<MouseButton>>()
            .init_resource::<Touches>()
            .insert_resource(dummy_assets())
            .add_systems(Update, (cancel_on_press, schedule_hints).chain());
        app
    }

    fn advance(app: &mut App, seconds: f32) {
        app.world_mut()
            .resource_mut::<Time>()
            .advance_by(Duration::from_secs_f32(seconds));
        app.update();
    }

    fn hint_node_count(app: &mut App) -> usize {
        app.world_mut()
            .query_filtered::<Entity, With<HintNode>>()
            .iter(app.world())
            .count()
    }

    #[test]
    fn hint_session_is_single_flight() {
        let mut app = hint_app();
        spawn_slot_with_goblin(&mut app, 0, Vec2::new(-50.0, 0.0));
        spawn_slot_with_goblin(&mut app, 1, Vec2::new(60.0, 0.0));

        advance(&mut app, HINT_IDLE_DELAY + 1.0);
        let after_first = hint_node_count(&mut app);
        assert_eq!(after_first, 2, "ghost and finger spawn for the drag hint");

        // The idle timer stays elapsed, but an active session blocks
        // another spawn: still exactly one set of nodes.
        advance(&mut app, 1.0);
        advance(&mut app, 1.0);
        assert_eq!(
            hint_node_count(&mut app),
            after_first,
            "a running hint session must not duplicate its nodes"
        );
    }

    #[test]
    fn pointer_press_cancels_the_session() {
        let mut app = hint_app();
        spawn_slot_with_goblin(&mut app, 0, Vec2::new(-50.0, 0.0));
        spawn_slot_with_goblin(&mut app, 1, Vec2::new(60.0, 0.0));

        advance(&mut app, HINT_IDLE_DELAY + 1.0);
        assert_eq!(hint_node_count(&mut app), 2);

        app.world_mut()
            .resource_mut::<ButtonInput<MouseButton>>()
            .press(MouseButton::Left);
        advance(&mut app, 0.1);

        assert_eq!(
            hint_node_count(&mut app),
            0,
            "a real pointer-down tears the hint down"
        );
        assert!(
            app.world().resource::<HintSession>().active.is_none(),
            "cancellation clears the session reference"
        );
    }

    #[test]
    fn cancelling_with_no_session_is_a_no_op() {
        let mut app = hint_app();
        app.world_mut()
            .resource_mut::<ButtonInput<MouseButton>>()
            .press(MouseButton::Left);
        advance(&mut app, 0.1);
        assert!(app.world().resource::<HintSession>().active.is_none());
    }
}
