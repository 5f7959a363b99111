use bevy::prelude::*;

use crate::core::GroupPurpose;

/// Easing curves used by the choreography. A tiny fixed set is enough; the
/// names follow the usual animation vocabulary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Ease {
    #[default]
    Linear,
    QuadIn,
    QuadOut,
    QuadInOut,
    SineInOut,
    /// Overshoots past the end value before settling, for pop-in reveals.
    BackOut,
}

pub fn sample(ease: Ease, t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    match ease {
        Ease::Linear => t,
        Ease::QuadIn => t * t,
        Ease::QuadOut => t * (2.0 - t),
        Ease::QuadInOut => {
            if t < 0.5 {
                2.0 * t * t
            } else {
                (4.0 - 2.0 * t).mul_add(t, -1.0)
            }
        }
        Ease::SineInOut => 0.5 * (1.0 - (std::f32::consts::PI * t).cos()),
        Ease::BackOut => {
            const S: f32 = 2.0;
            let u = t - 1.0;
            (S + 1.0).mul_add(u, S).mul_add(u * u, 1.0)
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum StepKind {
    /// Animate the target's local translation (z is preserved).
    Move { from: Vec2, to: Vec2 },
    /// Animate sprite or text alpha.
    Fade { from: f32, to: f32 },
    /// Animate the target's local scale.
    Scale { from: Vec2, to: Vec2 },
    /// Do nothing for the duration.
    Hold,
}

#[derive(Clone, Copy, Debug)]
pub struct TweenStep {
    pub kind: StepKind,
    pub duration: f32,
    pub ease: Ease,
}

impl TweenStep {
    pub const fn translate(from: Vec2, to: Vec2, duration: f32, ease: Ease) -> Self {
        Self {
            kind: StepKind::Move { from, to },
            duration,
            ease,
        }
    }

    pub const fn fade(from: f32, to: f32, duration: f32, ease: Ease) -> Self {
        Self {
            kind: StepKind::Fade { from, to },
            duration,
            ease,
        }
    }

    pub const fn scale(from: Vec2, to: Vec2, duration: f32, ease: Ease) -> Self {
        Self {
            kind: StepKind::Scale { from, to },
            duration,
            ease,
        }
    }

    pub const fn hold(duration: f32) -> Self {
        Self {
            kind: StepKind::Hold,
            duration,
            ease: Ease::Linear,
        }
    }
}

/// A sequence of steps driven against a target entity. Lives on its own
/// driver entity so several sequences can animate one target at once, and
/// so cancellation is "despawn every driver aimed at X".
#[derive(Component)]
pub struct TweenSeq {
    pub target: Entity,
    steps: Vec<TweenStep>,
    index: usize,
    elapsed: f32,
    looping: bool,
    group: Option<Entity>,
    mark_step: Option<usize>,
}

impl TweenSeq {
    pub fn new(target: Entity, steps: Vec<TweenStep>) -> Self {
        Self {
            target,
            steps,
            index: 0,
            elapsed: 0.0,
            looping: false,
            group: None,
            mark_step: None,
        }
    }

    pub fn looping(target: Entity, steps: Vec<TweenStep>) -> Self {
        Self {
            looping: true,
            ..Self::new(target, steps)
        }
    }

    pub const fn in_group(mut self, group: Entity) -> Self {
        self.group = Some(group);
        self
    }

    /// Completion of the given step raises a [`TweenMarkReached`] event.
    pub const fn with_mark(mut self, step: usize) -> Self {
        self.mark_step = Some(step);
        self
    }
}

/// Umbrella over several sequences. Tracks how many members are still
/// running, and latches the first mark so "first to finish wins" actions
/// fire exactly once.
#[derive(Component)]
pub struct TweenGroup {
    members_left: usize,
    mark_fired: bool,
}

impl TweenGroup {
    pub const fn new(members: usize) -> Self {
        Self {
            members_left: members,
            mark_fired: false,
        }
    }
}

/// A member sequence finished its marked step. `first` is true for exactly
/// one member per group; members without a group are always `first`.
#[derive(Event)]
pub struct TweenMarkReached {
    pub group: Option<Entity>,
    pub member: Entity,
    pub first: bool,
}

/// A sequence ran out of steps (looping sequences never finish).
#[derive(Event)]
pub struct TweenSeqFinished {
    pub target: Entity,
}

/// Every member of a group finished. The group entity is still alive so the
/// listener can read its [`GroupPurpose`]; the listener despawns it.
#[derive(Event)]
pub struct TweenGroupFinished {
    pub group: Entity,
}

pub fn spawn_seq(commands: &mut Commands, seq: TweenSeq) -> Entity {
    commands.spawn(seq).id()
}

pub fn spawn_group(commands: &mut Commands, members: usize, purpose: GroupPurpose) -> Entity {
    commands.spawn((TweenGroup::new(members), purpose)).id()
}

/// Despawns every driver animating `target`. Safe to call when none exist.
pub fn kill_tweens_for(
    commands: &mut Commands,
    drivers: &Query<(Entity, &TweenSeq)>,
    target: Entity,
) {
    for (driver, seq) in drivers {
        if seq.target == target {
            commands.entity(driver).despawn();
        }
    }
}

pub struct TweenPlugin;

impl Plugin for TweenPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<TweenMarkReached>()
            .add_event::<TweenSeqFinished>()
            .add_event::<TweenGroupFinished>()
            .add_systems(Update, tick_tweens);
    }
}

fn apply_step(
    step: &TweenStep,
    eased: f32,
    transform: &mut Transform,
    sprite: Option<&mut Sprite>,
    text_color: Option<&mut TextColor>,
) {
    match step.kind {
        StepKind::Move { from, to } => {
            let z = transform.translation.z;
            transform.translation = from.lerp(to, eased).extend(z);
        }
        StepKind::Scale { from, to } => {
            transform.scale = from.lerp(to, eased).extend(1.0);
        }
        StepKind::Fade { from, to } => {
            let alpha = (to - from).mul_add(eased, from);
            if let Some(sprite) = sprite {
                sprite.color.set_alpha(alpha);
            } else if let Some(text_color) = text_color {
                text_color.0.set_alpha(alpha);
            }
        }
        StepKind::Hold => {}
    }
}

pub fn tick_tweens(
    mut commands: Commands,
    time: Res<Time>,
    mut drivers: Query<(Entity, &mut TweenSeq)>,
    mut groups: Query<&mut TweenGroup>,
    mut transforms: Query<&mut Transform>,
    mut sprites: Query<&mut Sprite>,
    mut text_colors: Query<&mut TextColor>,
    mut marks: EventWriter<TweenMarkReached>,
    mut seq_done: EventWriter<TweenSeqFinished>,
    mut group_done: EventWriter<TweenGroupFinished>,
) {
    let delta = time.delta_secs();

    for (driver, mut seq) in &mut drivers {
        // The target can vanish mid-flight (scene teardown); the driver
        // must go quietly with it.
        let Ok(mut transform) = transforms.get_mut(seq.target) else {
            commands.entity(driver).despawn();
            continue;
        };

        seq.elapsed += delta;

        let mut finished = false;
        loop {
            let Some(step) = seq.steps.get(seq.index).copied() else {
                finished = true;
                break;
            };

            let progress = if step.duration <= f32::EPSILON {
                1.0
            } else {
                (seq.elapsed / step.duration).min(1.0)
            };

            apply_step(
                &step,
                sample(step.ease, progress),
                &mut transform,
                sprites.get_mut(seq.target).ok().as_deref_mut(),
                text_colors.get_mut(seq.target).ok().as_deref_mut(),
            );

            if progress < 1.0 {
                break;
            }

            if seq.mark_step == Some(seq.index) {
                let first = seq.group.map_or(true, |group| {
                    groups.get_mut(group).map_or(true, |mut group| {
                        let first = !group.mark_fired;
                        group.mark_fired = true;
                        first
                    })
                });
                marks.send(TweenMarkReached {
                    group: seq.group,
                    member: seq.target,
                    first,
                });
            }

            seq.elapsed = (seq.elapsed - step.duration).max(0.0);
            seq.index += 1;

            if seq.index >= seq.steps.len() {
                if seq.looping {
                    seq.index = 0;
                    // A degenerate all-zero loop would spin forever.
                    let total: f32 = seq.steps.iter().map(|s| s.duration).sum();
                    if total <= f32::EPSILON {
                        break;
                    }
                    if seq.elapsed <= f32::EPSILON {
                        break;
                    }
                } else {
                    finished = true;
                    break;
                }
            }
        }

        if finished {
            seq_done.send(TweenSeqFinished { target: seq.target });
            if let Some(group) = seq.group {
                if let Ok(mut group_state) = groups.get_mut(group) {
                    group_state.members_left = group_state.members_left.saturating_sub(1);
                    if group_state.members_left == 0 {
                        group_done.send(TweenGroupFinished { group });
                    }
                }
            }
            commands.entity(driver).despawn();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_app() -> App {
        let mut app = App::new();
        app.init_resource::<Time>()
            .add_event::<TweenMarkReached>()
            .add_event::<TweenSeqFinished>()
            .add_event::<TweenGroupFinished>()
            .add_systems(Update, tick_tweens);
        app
    }

    fn advance(app: &mut App, seconds: f32) {
        app.world_mut()
            .resource_mut::<Time>()
            .advance_by(Duration::from_secs_f32(seconds));
        app.update();
    }

    #[test]
    fn linear_move_reaches_target() {
        let mut app = test_app();
        let target = app
            .world_mut()
            .spawn(Transform::from_xyz(0.0, 0.0, 3.0))
            .id();
        let seq = TweenSeq::new(
            target,
            vec![TweenStep::translate(
                Vec2::ZERO,
                Vec2::new(100.0, 0.0),
                1.0,
                Ease::Linear,
            )],
        );
        app.world_mut().spawn(seq);

        advance(&mut app, 0.5);
        let mid = app.world().get::<Transform>(target).map(|t| t.translation);
        assert!(
            mid.is_some_and(|t| (t.x - 50.0).abs() < 0.01),
            "halfway through a linear move the target should sit at the midpoint"
        );

        advance(&mut app, 0.5);
        let end = app.world().get::<Transform>(target).map(|t| t.translation);
        assert!(
            end.is_some_and(|t| (t.x - 100.0).abs() < 0.01 && (t.z - 3.0).abs() < f32::EPSILON),
            "the move should land exactly on the target and keep z"
        );

        // Driver is gone once the sequence completes.
        let drivers = app
            .world_mut()
            .query::<&TweenSeq>()
            .iter(app.world())
            .count();
        assert_eq!(drivers, 0, "finished drivers should despawn");
    }

    #[test]
    fn group_finishes_only_after_all_members() {
        let mut app = test_app();
        let a = app.world_mut().spawn(Transform::default()).id();
        let b = app.world_mut().spawn(Transform::default()).id();
        let group = app
            .world_mut()
            .spawn((TweenGroup::new(2), GroupPurpose::Unlock))
            .id();

        for (target, duration) in [(a, 0.5), (b, 1.0)] {
            let seq = TweenSeq::new(
                target,
                vec![TweenStep::translate(
                    Vec2::ZERO,
                    Vec2::ONE,
                    duration,
                    Ease::Linear,
                )],
            )
            .in_group(group);
            app.world_mut().spawn(seq);
        }

        advance(&mut app, 0.6);
        let no_group_event = app
            .world()
            .resource::<Events<TweenGroupFinished>>()
            .is_empty();
        assert!(no_group_event, "the group must not finish while a member runs");

        advance(&mut app, 0.5);
        let events = app.world().resource::<Events<TweenGroupFinished>>();
        assert_eq!(events.len(), 1, "all members done exactly once");
    }

    #[test]
    fn first_mark_wins_the_latch() {
        let mut app = test_app();
        let a = app.world_mut().spawn(Transform::default()).id();
        let b = app.world_mut().spawn(Transform::default()).id();
        let group = app
            .world_mut()
            .spawn((
                TweenGroup::new(2),
                GroupPurpose::Merge { target_slot: a },
            ))
            .id();

        // Equal durations: registration order decides the winner.
        for target in [a, b] {
            let seq = TweenSeq::new(
                target,
                vec![TweenStep::translate(
                    Vec2::ZERO,
                    Vec2::ONE,
                    0.5,
                    Ease::Linear,
                )],
            )
            .in_group(group)
            .with_mark(0);
            app.world_mut().spawn(seq);
        }

        advance(&mut app, 0.6);

        let events = app.world().resource::<Events<TweenMarkReached>>();
        let mut cursor = events.get_cursor();
        let marks: Vec<_> = cursor.read(events).collect();
        assert_eq!(marks.len(), 2, "every member reports its mark");
        let firsts: Vec<_> = marks.iter().filter(|m| m.first).collect();
        assert_eq!(firsts.len(), 1, "the latch admits exactly one winner");
        assert_eq!(
            firsts.first().map(|m| m.member),
            Some(a),
            "equal durations resolve to the first registered member"
        );
    }

    #[test]
    fn looping_sequence_restarts_and_never_finishes() {
        let mut app = test_app();
        let target = app.world_mut().spawn(Transform::default()).id();
        let seq = TweenSeq::looping(
            target,
            vec![
                TweenStep::translate(Vec2::ZERO, Vec2::new(10.0, 0.0), 0.5, Ease::Linear),
                TweenStep::hold(0.5),
            ],
        );
        app.world_mut().spawn(seq);

        advance(&mut app, 1.1);
        let drivers = app
            .world_mut()
            .query::<&TweenSeq>()
            .iter(app.world())
            .count();
        assert_eq!(drivers, 1, "looping drivers stay alive");

        // A fresh cycle starts the move from its `from` value again.
        advance(&mut app, 0.15);
        let x = app
            .world()
            .get::<Transform>(target)
            .map(|t| t.translation.x);
        assert!(
            x.is_some_and(|x| x < 9.0),
            "after wrapping, the move should be near its start again, got {x:?}"
        );
    }

    #[test]
    fn despawned_target_removes_driver() {
        let mut app = test_app();
        let target = app.world_mut().spawn(Transform::default()).id();
        let seq = TweenSeq::new(
            target,
            vec![TweenStep::translate(
                Vec2::ZERO,
                Vec2::ONE,
                1.0,
                Ease::Linear,
            )],
        );
        app.world_mut().spawn(seq);
        app.world_mut().despawn(target);

        advance(&mut app, 0.1);
        let drivers = app
            .world_mut()
            .query::<&TweenSeq>()
            .iter(app.world())
            .count();
        assert_eq!(drivers, 0, "drivers with a dead target must clean up");
    }

    #[test]
    fn back_out_overshoots() {
        let almost = sample(Ease::BackOut, 0.7);
        assert!(almost > 1.0, "BackOut should overshoot before settling");
        assert!((sample(Ease::BackOut, 1.0) - 1.0).abs() < 1e-5);
        assert!(sample(Ease::BackOut, 0.0).abs() < 1e-5);
    }
}
