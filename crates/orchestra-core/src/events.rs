//! Standard lifecycle events and parameter keys.
//!
//! These are the events a host application typically fires from its own
//! lifecycle callbacks.  None of them are fired by the orchestrator itself,
//! except [`EAGER_LOAD`], which is only ever used as the context event while
//! eager services are being constructed.

use crate::event::{Event, ParameterKey};

// ─── Application lifecycle ───────────────────────────────────────────────────

/// The application finished launching.
pub const DID_FINISH_LAUNCHING: Event = Event::from_static("didFinishLaunching");
/// The application is about to terminate.
pub const WILL_TERMINATE: Event = Event::from_static("willTerminate");
/// The application became active.
pub const DID_BECOME_ACTIVE: Event = Event::from_static("didBecomeActive");
/// The application is about to become inactive.
pub const WILL_RESIGN_ACTIVE: Event = Event::from_static("willResignActive");
/// The application moved to the background.
pub const DID_ENTER_BACKGROUND: Event = Event::from_static("didEnterBackground");
/// The application is about to move to the foreground.
pub const WILL_ENTER_FOREGROUND: Event = Event::from_static("willEnterForeground");
/// The system reported memory pressure.
pub const DID_RECEIVE_MEMORY_WARNING: Event = Event::from_static("didReceiveMemoryWarning");
/// The wall clock changed significantly.
pub const SIGNIFICANT_TIME_CHANGE: Event = Event::from_static("significantTimeChange");
/// The application was asked to open a URL.
pub const OPEN_URL: Event = Event::from_static("openURL");

// ─── Scene lifecycle ─────────────────────────────────────────────────────────

/// A scene is about to connect.
pub const SCENE_WILL_CONNECT: Event = Event::from_static("sceneWillConnect");
/// A scene disconnected.
pub const SCENE_DID_DISCONNECT: Event = Event::from_static("sceneDidDisconnect");
/// A scene became active.
pub const SCENE_DID_BECOME_ACTIVE: Event = Event::from_static("sceneDidBecomeActive");
/// A scene is about to become inactive.
pub const SCENE_WILL_RESIGN_ACTIVE: Event = Event::from_static("sceneWillResignActive");
/// A scene is about to enter the foreground.
pub const SCENE_WILL_ENTER_FOREGROUND: Event = Event::from_static("sceneWillEnterForeground");
/// A scene entered the background.
pub const SCENE_DID_ENTER_BACKGROUND: Event = Event::from_static("sceneDidEnterBackground");

// ─── Phases ──────────────────────────────────────────────────────────────────
//
// Phases are not platform callbacks; hosts fire them to split startup into
// finer steps.

/// Start of the startup flow, before the root UI exists.
pub const APP_START: Event = Event::from_static("appStart");
/// End of the startup flow, root UI in place.
pub const APP_READY: Event = Event::from_static("appReady");

/// Context event used while eager services are constructed at bootstrap.
pub const EAGER_LOAD: Event = Event::from_static("Orchestrator.EagerLoad");

// ─── Parameter keys ──────────────────────────────────────────────────────────

/// The application object, when the host has one.
pub const APPLICATION: ParameterKey = ParameterKey::from_static("application");
/// Launch options passed to [`DID_FINISH_LAUNCHING`].
pub const LAUNCH_OPTIONS: ParameterKey = ParameterKey::from_static("launchOptions");
/// URL passed to [`OPEN_URL`].
pub const URL: ParameterKey = ParameterKey::from_static("url");
/// Open options passed to [`OPEN_URL`].
pub const OPTIONS: ParameterKey = ParameterKey::from_static("options");
/// Scene object for scene events.
pub const SCENE: ParameterKey = ParameterKey::from_static("scene");
/// Scene session for [`SCENE_WILL_CONNECT`].
pub const SESSION: ParameterKey = ParameterKey::from_static("session");
/// Connection options for [`SCENE_WILL_CONNECT`].
pub const CONNECTION_OPTIONS: ParameterKey = ParameterKey::from_static("connectionOptions");
