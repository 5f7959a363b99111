use bevy::prelude::*;
use playable_helpers::input::just_pressed_world_position;
use playable_helpers::{
    drain_shell_commands, send_playable_message, PlayableMessage, ShellCommand,
};

use crate::assets::AssetState;
use crate::core::{
    ChestOpened, FinishBackdrop, FinishCta, FinishLogo, FinishOverlay, ForceFinish, GamePhase,
    InstallButton, ResourceTally, RewardSequenceComplete, SessionStats, SoundToggled,
    HARD_SESSION_LIMIT, IDLE_SESSION_LIMIT,
};
use crate::tween::{spawn_seq, Ease, TweenSeq, TweenStep};

const INSTALL_TAP_RADIUS: f32 = 55.0;
const CTA_TAP_RADIUS: f32 = 70.0;
/// World position of the finish CTA (the overlay sits at the origin).
const CTA_POS: Vec2 = Vec2::new(0.0, -60.0);

/// Watchdogs against a stalled session: a hard cap from startup, and an
/// idle probe armed once the economy has produced rewards.
#[derive(Resource)]
pub struct SessionClock {
    hard: Timer,
    idle: Option<Timer>,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self {
            hard: Timer::from_seconds(HARD_SESSION_LIMIT, TimerMode::Once),
            idle: None,
        }
    }
}

pub struct FinishPlugin;

impl Plugin for FinishPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SessionClock>()
            .add_event::<ForceFinish>()
            .add_systems(
                Update,
                (
                    process_shell_commands,
                    tick_session_clock.run_if(not(in_state(GamePhase::Finished))),
                    arm_idle_probe,
                    reset_idle_on_press,
                    show_finish,
                    handle_install_taps,
                )
                    .run_if(in_state(AssetState::Ready)),
            );
    }
}

/// Commands from the embedding page become regular game events.
fn process_shell_commands(
    mut sound_toggled: EventWriter<SoundToggled>,
    mut force_finish: EventWriter<ForceFinish>,
) {
    for command in drain_shell_commands() {
        match command {
            ShellCommand::ToggleSound => {
                sound_toggled.send(SoundToggled);
            }
            ShellCommand::EndSession => {
                force_finish.send(ForceFinish);
            }
        }
    }
}

fn tick_session_clock(
    time: Res<Time>,
    mut clock: ResMut<SessionClock>,
    mut force_finish: EventWriter<ForceFinish>,
) {
    if clock.hard.tick(time.delta()).just_finished() {
        info!("hard session limit reached");
        force_finish.send(ForceFinish);
    }
    if let Some(idle) = &mut clock.idle {
        if idle.tick(time.delta()).just_finished() {
            info!("idle probe expired");
            force_finish.send(ForceFinish);
        }
    }
}

fn arm_idle_probe(mut opened: EventReader<ChestOpened>, mut clock: ResMut<SessionClock>) {
    for _ in opened.read() {
        if clock.idle.is_none() {
            clock.idle = Some(Timer::from_seconds(IDLE_SESSION_LIMIT, TimerMode::Once));
        }
    }
}

fn reset_idle_on_press(
    mouse_input: Res<ButtonInput<MouseButton>>,
    touch_input: Res<Touches>,
    mut clock: ResMut<SessionClock>,
) {
    if !mouse_input.just_pressed(MouseButton::Left) && !touch_input.any_just_pressed() {
        return;
    }
    if let Some(idle) = &mut clock.idle {
        idle.reset();
    }
}

/// Brings up the install overlay once, on completion or on a watchdog.
fn show_finish(
    mut complete: EventReader<RewardSequenceComplete>,
    mut forced: EventReader<ForceFinish>,
    phase: Res<State<GamePhase>>,
    mut next_phase: ResMut<NextState<GamePhase>>,
    mut overlays: Query<&mut Visibility, With<FinishOverlay>>,
    backdrops: Query<Entity, With<FinishBackdrop>>,
    logos: Query<Entity, With<FinishLogo>>,
    ctas: Query<Entity, With<FinishCta>>,
    stats: Res<SessionStats>,
    tally: Res<ResourceTally>,
    mut commands: Commands,
) {
    let completed = complete.read().next().is_some();
    let was_forced = forced.read().next().is_some();
    if !(completed || was_forced) || *phase.get() == GamePhase::Finished {
        return;
    }
    next_phase.set(GamePhase::Finished);

    for mut visibility in &mut overlays {
        *visibility = Visibility::Visible;
    }
    for backdrop in &backdrops {
        spawn_seq(
            &mut commands,
            TweenSeq::new(
                backdrop,
                vec![TweenStep::fade(0.0, 0.7, 0.4, Ease::QuadOut)],
            ),
        );
    }
    for logo in &logos {
        spawn_seq(
            &mut commands,
            TweenSeq::new(
                logo,
                vec![TweenStep::scale(Vec2::ZERO, Vec2::ONE, 0.5, Ease::BackOut)],
            ),
        );
    }
    for cta in &ctas {
        spawn_seq(
            &mut commands,
            TweenSeq::new(
                cta,
                vec![TweenStep::scale(Vec2::ZERO, Vec2::ONE, 0.5, Ease::BackOut)],
            ),
        );
        // Gentle pulse once the pop-in has settled.
        spawn_seq(
            &mut commands,
            TweenSeq::looping(
                cta,
                vec![
                    TweenStep::hold(0.5),
                    TweenStep::scale(Vec2::ONE, Vec2::splat(1.1), 0.5, Ease::SineInOut),
                    TweenStep::scale(Vec2::splat(1.1), Vec2::ONE, 0.5, Ease::SineInOut),
                ],
            ),
        );
    }

    send_playable_message(PlayableMessage::SessionEnded {
        merges: stats.merges,
        rewards: tally.total(),
    });
    info!(merges = stats.merges, rewards = tally.total(), "session ended");
}

/// Both the always-present corner button and the end-screen CTA report
/// install intent to the embedding shell; the shell owns the redirect.
fn handle_install_taps(
    mouse_input: Res<ButtonInput<MouseButton>>,
    touch_input: Res<Touches>,
    windows: Query<&Window>,
    camera: Query<(&Camera, &GlobalTransform)>,
    phase: Res<State<GamePhase>>,
    buttons: Query<&Transform, With<InstallButton>>,
) {
    let Some(pointer) = just_pressed_world_position(&mouse_input, &touch_input, &windows, &camera)
    else {
        return;
    };

    let on_button = buttons
        .iter()
        .any(|transform| transform.translation.truncate().distance(pointer) < INSTALL_TAP_RADIUS);
    let on_cta =
        *phase.get() == GamePhase::Finished && pointer.distance(CTA_POS) < CTA_TAP_RADIUS;

    if on_button || on_cta {
        send_playable_message(PlayableMessage::InstallIntent);
        info!("install intent reported");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn clock_app() -> App {
        let mut app = App::new();
        app.init_resource::<Time>()
            .init_resource::<SessionClock>()
            .add_event::<ForceFinish>()
            .add_event::<ChestOpened>()
            .add_systems(Update, (arm_idle_probe, tick_session_clock).chain());
        app
    }

    fn advance(app: &mut App, seconds: f32) {
        app.world_mut()
            .resource_mut::<Time>()
            .advance_by(Duration::from_secs_f32(seconds));
        app.update();
    }

    #[test]
    fn hard_limit_forces_the_finish() {
        let mut app = clock_app();
        advance(&mut app, HARD_SESSION_LIMIT - 1.0);
        assert!(
            app.world().resource::<Events<ForceFinish>>().is_empty(),
            "no finish before the cap"
        );
        advance(&mut app, 2.0);
        assert!(
            !app.world().resource::<Events<ForceFinish>>().is_empty(),
            "the 20s cap must force the end screen"
        );
    }

    #[test]
    fn idle_probe_only_arms_after_rewards() {
        let mut app = clock_app();
        advance(&mut app, IDLE_SESSION_LIMIT + 1.0);
        assert!(
            app.world().resource::<Events<ForceFinish>>().is_empty(),
            "idle probe must not run before any chest opened"
        );

        let chest = app.world_mut().spawn_empty().id();
        app.world_mut().send_event(ChestOpened { chest });
        advance(&mut app, IDLE_SESSION_LIMIT + 1.0);
        assert!(
            !app.world().resource::<Events<ForceFinish>>().is_empty(),
            "after rewards, idle time forces the end screen"
        );
    }
}
