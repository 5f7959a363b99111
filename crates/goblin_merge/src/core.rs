use bevy::prelude::*;
use strum::EnumIter;

/// Maximum on-screen distance for a drop to register against a same-tier
/// neighbour. The boundary is exclusive: a goblin released at exactly this
/// distance snaps back instead of merging.
pub const SNAP_RADIUS: f32 = 150.0;
/// Pick-up radius around a goblin for starting a drag.
pub const GRAB_RADIUS: f32 = 48.0;
/// Duration of the snap-back tween after a failed drop (seconds)
pub const RETURN_DURATION: f32 = 0.3;
/// Duration of the converge-on-target flight during merges (seconds)
pub const CONVERGE_DURATION: f32 = 0.35;
/// Fade-out after a converge flight (seconds)
pub const CONVERGE_FADE_DURATION: f32 = 0.3;
/// Slots and chests fly from the screen center to their spots in this time
pub const REVEAL_DURATION: f32 = 0.6;
/// Reward sprite flight time to its HUD counter (seconds)
pub const FLIGHT_DURATION: f32 = 0.7;
/// Delay between consecutive reward launches from an open chest (seconds)
pub const BURST_STAGGER: f32 = 0.1;
/// Rewards of each kind a chest releases
pub const BURST_PER_KIND: u32 = 20;
/// Hard cap on session length before the install screen is forced (seconds)
pub const HARD_SESSION_LIMIT: f32 = 20.0;
/// Idle time after the economy has produced rewards before the install
/// screen is forced (seconds)
pub const IDLE_SESSION_LIMIT: f32 = 5.0;
/// Idle time before a tutorial hint starts looping (seconds)
pub const HINT_IDLE_DELAY: f32 = 5.0;

/// Session-wide stage. `Start` is the pre-economy teaser where only the
/// first merge gesture works; `Move` is the full merge-and-collect loop.
/// There is no way back from `Move` to `Start`.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Default, States)]
pub enum GamePhase {
    #[default]
    Start,
    Move,
    Finished,
}

/// Tier tag deciding which goblins may merge with each other. Every
/// upgraded goblin shares the `Upgraded` tag, so upgraded goblins are all
/// mutually mergeable regardless of their base tier.
#[derive(Component, Clone, Copy, PartialEq, Eq, Debug)]
pub enum GoblinTier {
    TierA,
    TierB,
    Upgraded,
}

/// An interactive creature sprite. Lives as a child of its slot.
#[derive(Component)]
pub struct Goblin {
    pub slot: Entity,
}

/// Container for one goblin and its pre-spawned upgraded form. Slots are
/// never despawned during a session; a slot consumed by a merge is flagged
/// hidden and can be revived later by the mine.
#[derive(Component)]
pub struct GoblinSlot {
    pub tier: GoblinTier,
    pub hidden: bool,
}

/// Stable slot ordering, used for deterministic candidate iteration.
#[derive(Component, Clone, Copy)]
pub struct SlotIndex(pub usize);

/// Child entities of a slot, resolved once at spawn time.
#[derive(Component)]
pub struct SlotSprites {
    pub ring: Entity,
    pub ore: Entity,
    pub base: Entity,
    pub upgrade: Entity,
}

impl SlotSprites {
    /// The sprite currently standing in for the slot, picked by tier.
    pub const fn occupant(&self, tier: GoblinTier) -> Entity {
        match tier {
            GoblinTier::Upgraded => self.upgrade,
            GoblinTier::TierA | GoblinTier::TierB => self.base,
        }
    }
}

/// Marks a goblin sprite as the interactive occupant of its slot.
#[derive(Component)]
pub struct Draggable;

/// Same-tier highlight ring shown while a drag is in progress.
#[derive(Component)]
pub struct ShineRing;

/// Openable treasure chest.
#[derive(Component)]
pub struct Chest {
    pub opened: bool,
}

#[derive(Component, Clone, Copy)]
pub struct ChestIndex(pub usize);

#[derive(Component)]
pub struct ChestSprites {
    pub closed: Entity,
    pub open: Entity,
}

/// The tappable mine driving reveal progression.
#[derive(Component)]
pub struct Mine;

/// The mine's body sprite (the container holds it plus the smoke).
#[derive(Component)]
pub struct MineBody;

/// One-shot smoke puff played on every mine tap.
#[derive(Component)]
pub struct MineSmoke;

#[derive(Component)]
pub struct MergeText;

#[derive(Component)]
pub struct InstallButton;

#[derive(Component)]
pub struct AdBadge;

#[derive(Component)]
pub struct FinishOverlay;

#[derive(Component)]
pub struct FinishBackdrop;

#[derive(Component)]
pub struct FinishLogo;

#[derive(Component)]
pub struct FinishCta;

/// HUD currencies. Iteration order is the order of the bars on screen.
#[derive(Component, Clone, Copy, PartialEq, Eq, Debug, EnumIter)]
pub enum ResourceKind {
    Coin,
    Gem,
    Potion,
}

impl ResourceKind {
    pub const fn index(self) -> usize {
        match self {
            Self::Coin => 0,
            Self::Gem => 1,
            Self::Potion => 2,
        }
    }
}

/// HUD icon a reward sprite flies to.
#[derive(Component)]
pub struct ResourceIcon(pub ResourceKind);

/// HUD counter text next to an icon.
#[derive(Component)]
pub struct ResourceLabel(pub ResourceKind);

/// Capability marker: this goblin can emit rewards on its work-animation
/// beat. Checked explicitly instead of probing for methods that may or may
/// not exist.
#[derive(Component, Default)]
pub struct RewardEmitter {
    pub active: bool,
    pub last_frame: usize,
}

/// Collected reward counts per kind.
#[derive(Resource, Default)]
pub struct ResourceTally([u32; 3]);

impl ResourceTally {
    pub fn add(&mut self, kind: ResourceKind) {
        if let Some(count) = self.0.get_mut(kind.index()) {
            *count += 1;
        }
    }

    pub fn get(&self, kind: ResourceKind) -> u32 {
        self.0.get(kind.index()).copied().unwrap_or_default()
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }
}

/// Why a tween group exists; consulted when its members reach their marks
/// and when the whole group settles.
#[derive(Component, Clone, Copy)]
pub enum GroupPurpose {
    /// First successful drop gesture: everything converges on the screen
    /// center, then the scene activates.
    Unlock,
    /// Post-unlock drop gesture: losers converge on the chosen slot and the
    /// first to arrive commits the merge.
    Merge { target_slot: Entity },
    /// Mine pop-in shake; its completion reveals the rest of the scene.
    MineIntro,
    /// Slots and chests flying from the center to their authored spots.
    Reveal,
}

#[derive(Event)]
pub struct MineActivated;

/// The mine finished its entrance; the build sound keys off this.
#[derive(Event)]
pub struct StructureRevealed;

#[derive(Event)]
pub struct MergeCommitted {
    pub loser: Entity,
    pub target_slot: Entity,
}

#[derive(Event)]
pub struct OpenChestRequest {
    pub chest: Entity,
}

#[derive(Event)]
pub struct ChestOpened {
    pub chest: Entity,
}

/// All chests opened and every reward landed on its counter.
#[derive(Event)]
pub struct RewardSequenceComplete;

#[derive(Event)]
pub struct SoundToggled;

/// Ends the session immediately (timeout or shell command).
#[derive(Event)]
pub struct ForceFinish;

#[derive(Resource, Default)]
pub struct SessionStats {
    pub merges: u32,
}
