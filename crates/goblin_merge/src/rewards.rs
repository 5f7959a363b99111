use bevy::color::palettes::css::GOLD;
use bevy::prelude::*;
use playable_helpers::floating_text::{animate_floating_text, spawn_floating_text};
use playable_helpers::input::just_pressed_world_position;
use strum::IntoEnumIterator;

use crate::animation::AtlasAnimation;
use crate::assets::{AssetState, GameAssets, EMIT_FRAME};
use crate::core::{
    Chest, ChestOpened, ChestSprites, Draggable, GamePhase, Goblin, OpenChestRequest,
    ResourceIcon, ResourceKind, ResourceLabel, ResourceTally, RewardEmitter,
    RewardSequenceComplete, BURST_PER_KIND, BURST_STAGGER, FLIGHT_DURATION,
};
use crate::scene::Z_FLIGHT;
use crate::tween::{kill_tweens_for, spawn_seq, Ease, TweenSeq, TweenSeqFinished, TweenStep};

const CHEST_TAP_RADIUS: f32 = 60.0;

/// A tapped chest drains its contents over time: one launch wave per tick
/// of the stagger timer, one sprite of each kind per wave.
#[derive(Component)]
pub struct ChestBurst {
    timer: Timer,
    launched: u32,
    landed: u32,
}

impl Default for ChestBurst {
    fn default() -> Self {
        Self {
            timer: Timer::from_seconds(BURST_STAGGER, TimerMode::Repeating),
            launched: 0,
            landed: 0,
        }
    }
}

/// A reward sprite in flight towards its HUD counter.
#[derive(Component)]
pub struct RewardFlight {
    kind: ResourceKind,
    chest: Option<Entity>,
}

pub struct RewardPlugin;

impl Plugin for RewardPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ResourceTally>()
            .add_event::<OpenChestRequest>()
            .add_event::<ChestOpened>()
            .add_event::<RewardSequenceComplete>()
            .add_systems(OnEnter(GamePhase::Move), activate_emitters)
            .add_systems(
                Update,
                (
                    handle_chest_taps.run_if(in_state(GamePhase::Move)),
                    open_chests,
                    run_chest_bursts,
                    emit_goblin_coins.run_if(in_state(GamePhase::Move)),
                    handle_flight_arrivals,
                    update_resource_labels,
                    animate_floating_text,
                )
                    .run_if(in_state(AssetState::Ready)),
            );
    }
}

fn icon_image(assets: &GameAssets, kind: ResourceKind) -> Handle<Image> {
    match kind {
        ResourceKind::Coin => assets.coin.clone(),
        ResourceKind::Gem => assets.gem.clone(),
        ResourceKind::Potion => assets.potion.clone(),
    }
}

fn icon_position(
    icons: &Query<(&ResourceIcon, &GlobalTransform)>,
    kind: ResourceKind,
) -> Option<Vec2> {
    icons
        .iter()
        .find(|(icon, _)| icon.0 == kind)
        .map(|(_, transform)| transform.translation().truncate())
}

fn spawn_reward_flight(
    commands: &mut Commands,
    assets: &GameAssets,
    kind: ResourceKind,
    from: Vec2,
    to: Vec2,
    chest: Option<Entity>,
) {
    let sprite = commands
        .spawn((
            Sprite {
                image: icon_image(assets, kind),
                custom_size: Some(Vec2::splat(20.0)),
                ..default()
            },
            Transform::from_translation(from.extend(Z_FLIGHT)),
            RewardFlight { kind, chest },
        ))
        .id();
    spawn_seq(
        commands,
        TweenSeq::new(
            sprite,
            vec![TweenStep::translate(
                from,
                to,
                FLIGHT_DURATION,
                Ease::QuadInOut,
            )],
        ),
    );
}

fn activate_emitters(
    mut emitters: Query<(&mut RewardEmitter, &InheritedVisibility), With<Draggable>>,
) {
    for (mut emitter, visibility) in &mut emitters {
        if visibility.get() {
            emitter.active = true;
        }
    }
}

fn handle_chest_taps(
    mouse_input: Res<ButtonInput<MouseButton>>,
    touch_input: Res<Touches>,
    windows: Query<&Window>,
    camera: Query<(&Camera, &GlobalTransform)>,
    chests: Query<(Entity, &Chest, &Transform, &Visibility)>,
    mut requests: EventWriter<OpenChestRequest>,
) {
    let Some(pointer) = just_pressed_world_position(&mouse_input, &touch_input, &windows, &camera)
    else {
        return;
    };
    for (entity, chest, transform, visibility) in &chests {
        if chest.opened || *visibility == Visibility::Hidden {
            continue;
        }
        if transform.translation.truncate().distance(pointer) < CHEST_TAP_RADIUS {
            requests.send(OpenChestRequest { chest: entity });
        }
    }
}

fn open_chests(
    mut requests: EventReader<OpenChestRequest>,
    mut chests: Query<(&mut Chest, &ChestSprites)>,
    mut visibilities: Query<&mut Visibility>,
    drivers: Query<(Entity, &TweenSeq)>,
    mut opened_events: EventWriter<ChestOpened>,
    mut commands: Commands,
) {
    for request in requests.read() {
        let Ok((mut chest, sprites)) = chests.get_mut(request.chest) else {
            warn!("open request for unknown chest {}", request.chest);
            continue;
        };
        if chest.opened {
            continue;
        }
        chest.opened = true;

        // The breathing loop dies with the closed lid.
        kill_tweens_for(&mut commands, &drivers, sprites.closed);
        if let Ok(mut visibility) = visibilities.get_mut(sprites.closed) {
            *visibility = Visibility::Hidden;
        }
        if let Ok(mut visibility) = visibilities.get_mut(sprites.open) {
            *visibility = Visibility::Visible;
        }

        commands.entity(request.chest).insert(ChestBurst::default());
        opened_events.send(ChestOpened {
            chest: request.chest,
        });
    }
}

fn run_chest_bursts(
    time: Res<Time>,
    mut bursts: Query<(Entity, &Transform, &mut ChestBurst)>,
    icons: Query<(&ResourceIcon, &GlobalTransform)>,
    assets: Res<GameAssets>,
    mut commands: Commands,
) {
    for (chest, transform, mut burst) in &mut bursts {
        burst.timer.tick(time.delta());
        if !burst.timer.just_finished() || burst.launched >= BURST_PER_KIND {
            continue;
        }
        burst.launched += 1;

        let from = transform.translation.truncate() + Vec2::new(0.0, 28.0);
        for kind in ResourceKind::iter() {
            let Some(target) = icon_position(&icons, kind) else {
                error!("no HUD icon for {kind:?}");
                continue;
            };
            spawn_reward_flight(&mut commands, &assets, kind, from, target, Some(chest));
        }
    }
}

/// Working goblins toss a coin towards the HUD on the strike frame of
/// their swing.
fn emit_goblin_coins(
    mut goblins: Query<(&Sprite, &GlobalTransform, &mut RewardEmitter, &AtlasAnimation), With<Goblin>>,
    icons: Query<(&ResourceIcon, &GlobalTransform)>,
    assets: Res<GameAssets>,
    mut commands: Commands,
) {
    for (sprite, transform, mut emitter, animation) in &mut goblins {
        let Some(atlas) = &sprite.texture_atlas else {
            continue;
        };
        let frame = atlas.index;
        if emitter.active
            && animation.playing
            && frame == EMIT_FRAME
            && emitter.last_frame != EMIT_FRAME
        {
            if let Some(target) = icon_position(&icons, ResourceKind::Coin) {
                spawn_reward_flight(
                    &mut commands,
                    &assets,
                    ResourceKind::Coin,
                    transform.translation().truncate(),
                    target,
                    None,
                );
            }
        }
        emitter.last_frame = frame;
    }
}

fn handle_flight_arrivals(
    mut arrivals: EventReader<TweenSeqFinished>,
    flights: Query<&RewardFlight>,
    mut bursts: Query<&mut ChestBurst>,
    chest_sprites: Query<&ChestSprites>,
    all_chests: Query<&Chest>,
    icons: Query<(&ResourceIcon, &GlobalTransform)>,
    mut tally: ResMut<ResourceTally>,
    asset_server: Res<AssetServer>,
    mut complete: EventWriter<RewardSequenceComplete>,
    mut commands: Commands,
) {
    for arrival in arrivals.read() {
        let Ok(flight) = flights.get(arrival.target) else {
            continue;
        };
        tally.add(flight.kind);
        if let Some(position) = icon_position(&icons, flight.kind) {
            spawn_floating_text(&mut commands, position, "+1", GOLD, &asset_server);
        }

        let chest = flight.chest;
        commands.entity(arrival.target).despawn();

        let Some(chest) = chest else {
            continue;
        };
        let Ok(mut burst) = bursts.get_mut(chest) else {
            continue;
        };
        burst.landed += 1;
        if burst.landed < BURST_PER_KIND * 3 {
            continue;
        }

        // The last reward landed: the open lid fades away.
        if let Ok(sprites) = chest_sprites.get(chest) {
            spawn_seq(
                &mut commands,
                TweenSeq::new(
                    sprites.open,
                    vec![TweenStep::fade(1.0, 0.0, 0.5, Ease::QuadIn)],
                ),
            );
        }
        commands.entity(chest).remove::<ChestBurst>();

        let all_opened = all_chests.iter().all(|c| c.opened);
        let last_burst = bursts.iter().count() == 1;
        if all_opened && last_burst {
            complete.send(RewardSequenceComplete);
        }
    }
}

fn update_resource_labels(
    tally: Res<ResourceTally>,
    mut labels: Query<(&ResourceLabel, &mut Text2d)>,
) {
    if !tally.is_changed() {
        return;
    }
    for (label, mut text) in &mut labels {
        *text = Text2d::new(tally.get(label.0).to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_per_kind() {
        let mut tally = ResourceTally::default();
        tally.add(ResourceKind::Coin);
        tally.add(ResourceKind::Coin);
        tally.add(ResourceKind::Gem);
        assert_eq!(tally.get(ResourceKind::Coin), 2);
        assert_eq!(tally.get(ResourceKind::Gem), 1);
        assert_eq!(tally.get(ResourceKind::Potion), 0);
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn opening_a_chest_is_idempotent() {
        let mut app = App::new();
        app.add_event::<OpenChestRequest>()
            .add_event::<ChestOpened>()
            .add_systems(Update, open_chests);

        let closed = app
            .world_mut()
            .spawn((Visibility::Visible, Transform::default()))
            .id();
        let open = app
            .world_mut()
            .spawn((Visibility::Hidden, Transform::default()))
            .id();
        let chest = app
            .world_mut()
            .spawn((
                Chest { opened: false },
                ChestSprites { closed, open },
                Transform::default(),
            ))
            .id();

        app.world_mut().send_event(OpenChestRequest { chest });
        app.world_mut().send_event(OpenChestRequest { chest });
        app.update();

        let events = app.world().resource::<Events<ChestOpened>>();
        assert_eq!(events.len(), 1, "a chest opens once, no matter the taps");
        assert_eq!(
            app.world().get::<Visibility>(open).copied(),
            Some(Visibility::Visible)
        );
        assert!(
            app.world().get::<ChestBurst>(chest).is_some(),
            "opening starts the reward burst"
        );
    }
}
