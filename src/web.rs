//! Browser bindings
//!
//! Exposes the unit to VPAID players as `getVPAIDAd()` and adapts the DOM to
//! the collaborator traits:
//!
//! ```text
//! player ──JS calls──► VpaidAd ──► AdUnit
//!                                    │
//!        HtmlMediaElement ◄── HtmlVideoMedia      (timeupdate / ended / error)
//!        slot + window    ◄── DomFrameContainer   (wrapper div + iframe, message)
//!        <img>            ◄── ImageBeacon
//! ```
//!
//! DOM listeners are `Closure`s kept next to the registration they belong
//! to and removed with the very same function reference.

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Array, Function, Reflect};
use serde_json::Value;
use url::Url;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, HtmlElement, HtmlIFrameElement, HtmlImageElement, HtmlMediaElement, MessageEvent, Window,
};

use crate::config::UnitConfig;
use crate::controller::{AdEnvironment, AdUnit};
use crate::error::{HostError, HostResult};
use crate::media::{checked_volume, MediaElement, MediaListener, MediaSignal};
use crate::overlay::{FrameContainer, FrameId, FrameSpec, ListenerId, MessageListener};
use crate::tracking::BeaconSink;
use vpaid_types::{AdEvent, AdEventKind, CreativeData, ViewMode};

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();
}

fn describe(err: &JsValue) -> String {
    err.as_string()
        .or_else(|| err.dyn_ref::<js_sys::Error>().map(|e| String::from(e.message())))
        .unwrap_or_else(|| format!("{err:?}"))
}

fn get(target: &JsValue, key: &str) -> Option<JsValue> {
    Reflect::get(target, &JsValue::from_str(key))
        .ok()
        .filter(|value| !value.is_undefined() && !value.is_null())
}

// ============================================================================
// Media
// ============================================================================

struct MediaHandlers {
    time_update: Closure<dyn FnMut()>,
    ended: Closure<dyn FnMut()>,
    error: Closure<dyn FnMut()>,
}

impl MediaHandlers {
    fn each(&self) -> [(&'static str, &Function); 3] {
        [
            ("timeupdate", self.time_update.as_ref().unchecked_ref()),
            ("ended", self.ended.as_ref().unchecked_ref()),
            ("error", self.error.as_ref().unchecked_ref()),
        ]
    }
}

/// The player's `videoSlot`.
pub struct HtmlVideoMedia {
    element: HtmlMediaElement,
    handlers: Option<MediaHandlers>,
}

impl HtmlVideoMedia {
    pub fn new(element: HtmlMediaElement) -> Self {
        Self {
            element,
            handlers: None,
        }
    }
}

/// `MediaError` code and message, when the element has one.
fn media_error_detail(element: &HtmlMediaElement) -> Option<String> {
    let error = get(element, "error")?;
    let message = get(&error, "message")
        .and_then(|m| m.as_string())
        .filter(|m| !m.is_empty());
    let code = get(&error, "code").and_then(|c| c.as_f64());
    match (message, code) {
        (Some(message), _) => Some(message),
        (None, Some(code)) => Some(format!("MediaError code {code}")),
        (None, None) => None,
    }
}

impl MediaElement for HtmlVideoMedia {
    fn current_time(&self) -> f64 {
        self.element.current_time()
    }

    fn duration(&self) -> f64 {
        self.element.duration()
    }

    fn volume(&self) -> f64 {
        self.element.volume()
    }

    fn set_volume(&mut self, volume: f64) -> HostResult<()> {
        // The `volume` setter throws without being caught; never let it.
        self.element.set_volume(checked_volume(volume)?);
        Ok(())
    }

    fn play(&mut self) -> HostResult<()> {
        // The returned promise rejects on autoplay policy; the element then
        // stays paused and the player decides what to do.
        self.element
            .play()
            .map(drop)
            .map_err(|err| HostError::media("play", describe(&err)))
    }

    fn pause(&mut self) -> HostResult<()> {
        self.element
            .pause()
            .map_err(|err| HostError::media("pause", describe(&err)))
    }

    fn set_source(&mut self, url: &str) -> HostResult<()> {
        self.element.set_src(url);
        Ok(())
    }

    fn clear_source(&mut self) -> HostResult<()> {
        self.element
            .remove_attribute("src")
            .map_err(|err| HostError::media("clear_source", describe(&err)))?;
        self.element.load();
        Ok(())
    }

    fn attach_listener(&mut self, listener: MediaListener) -> HostResult<()> {
        self.detach_listener()?;

        let on_tick = listener.clone();
        let on_end = listener.clone();
        let element = self.element.clone();
        let handlers = self.handlers.insert(MediaHandlers {
            time_update: Closure::wrap(
                Box::new(move || on_tick(MediaSignal::PositionChanged)) as Box<dyn FnMut()>
            ),
            ended: Closure::wrap(Box::new(move || on_end(MediaSignal::Ended)) as Box<dyn FnMut()>),
            error: Closure::wrap(Box::new(move || {
                listener(MediaSignal::Error {
                    detail: media_error_detail(&element),
                })
            }) as Box<dyn FnMut()>),
        });

        for (name, callback) in handlers.each() {
            self.element
                .add_event_listener_with_callback(name, callback)
                .map_err(|err| HostError::media("attach_listener", describe(&err)))?;
        }
        Ok(())
    }

    fn detach_listener(&mut self) -> HostResult<()> {
        let Some(handlers) = self.handlers.take() else {
            return Ok(());
        };
        for (name, callback) in handlers.each() {
            if let Err(err) = self.element.remove_event_listener_with_callback(name, callback) {
                tracing::warn!(event = name, error = %describe(&err), "media listener removal failed");
            }
        }
        // `ended` stops the ad, which detaches from inside the handler that
        // is running. Leak rather than free a closure on its own stack.
        handlers.time_update.forget();
        handlers.ended.forget();
        handlers.error.forget();
        Ok(())
    }
}

// ============================================================================
// Overlay slot
// ============================================================================

struct DomFrame {
    id: FrameId,
    wrapper: HtmlElement,
    iframe: HtmlIFrameElement,
}

/// The player's `slot` element, plus the window the overlay posts to.
pub struct DomFrameContainer {
    window: Window,
    document: Document,
    slot: HtmlElement,
    next_id: u64,
    frames: Rc<RefCell<Vec<DomFrame>>>,
    listeners: Vec<(ListenerId, Closure<dyn FnMut(MessageEvent)>)>,
}

impl DomFrameContainer {
    pub fn new(slot: HtmlElement) -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("No document"))?;
        Ok(Self {
            window,
            document,
            slot,
            next_id: 0,
            frames: Rc::default(),
            listeners: Vec::new(),
        })
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn build_frame(&self, spec: &FrameSpec) -> Result<(HtmlElement, HtmlIFrameElement), JsValue> {
        let wrapper: HtmlElement = self.document.create_element("div")?.dyn_into()?;
        wrapper.style().set_css_text(spec.wrapper_style);

        let iframe: HtmlIFrameElement = self.document.create_element("iframe")?.dyn_into()?;
        iframe.set_src(&spec.url);
        iframe.style().set_css_text(spec.frame_style);
        if spec.allow_fullscreen {
            iframe.set_attribute("allowfullscreen", "true")?;
        }
        iframe.set_attribute("allow", spec.allow)?;
        if !spec.sandbox.is_empty() {
            iframe.set_attribute("sandbox", &spec.sandbox)?;
        }

        wrapper.append_child(&iframe)?;
        self.slot.append_child(&wrapper)?;
        Ok((wrapper, iframe))
    }
}

/// Whether `source` is the content window of one of our frames.
fn posted_by_frame(frames: &RefCell<Vec<DomFrame>>, source: Option<js_sys::Object>) -> bool {
    let Some(source) = source.map(JsValue::from) else {
        return false;
    };
    frames.borrow().iter().any(|frame| {
        frame
            .iframe
            .content_window()
            .is_some_and(|window| JsValue::from(window) == source)
    })
}

impl FrameContainer for DomFrameContainer {
    fn create_frame(&mut self, spec: &FrameSpec) -> HostResult<FrameId> {
        let (wrapper, iframe) = self
            .build_frame(spec)
            .map_err(|err| HostError::FrameCreation(describe(&err)))?;
        let id = FrameId(self.next_id());
        self.frames.borrow_mut().push(DomFrame { id, wrapper, iframe });
        Ok(id)
    }

    fn resize_frame(&mut self, frame: FrameId, width: u32, height: u32) -> HostResult<()> {
        let frames = self.frames.borrow();
        let target = frames
            .iter()
            .find(|f| f.id == frame)
            .ok_or_else(|| HostError::FrameResize {
                frame,
                reason: "unknown frame".into(),
            })?;
        let style = target.iframe.style();
        style
            .set_property("width", &format!("{width}px"))
            .and_then(|_| style.set_property("height", &format!("{height}px")))
            .map_err(|err| HostError::FrameResize {
                frame,
                reason: describe(&err),
            })
    }

    fn remove_frame(&mut self, frame: FrameId) -> HostResult<()> {
        let mut frames = self.frames.borrow_mut();
        let index = frames
            .iter()
            .position(|f| f.id == frame)
            .ok_or_else(|| HostError::FrameRemoval {
                frame,
                reason: "unknown frame".into(),
            })?;
        let removed = frames.remove(index);
        removed.wrapper.remove();
        Ok(())
    }

    fn add_message_listener(&mut self, listener: MessageListener) -> HostResult<ListenerId> {
        let frames = Rc::clone(&self.frames);
        let callback = Closure::wrap(Box::new(move |event: MessageEvent| {
            if !posted_by_frame(&frames, event.source()) {
                tracing::trace!("message from a foreign window dropped");
                return;
            }
            match serde_wasm_bindgen::from_value::<Value>(event.data()) {
                Ok(payload) => listener(&payload),
                Err(err) => tracing::trace!(error = %err, "unreadable message payload"),
            }
        }) as Box<dyn FnMut(MessageEvent)>);

        self.window
            .add_event_listener_with_callback("message", callback.as_ref().unchecked_ref())
            .map_err(|err| HostError::ListenerRegistration(describe(&err)))?;

        let id = ListenerId(self.next_id());
        self.listeners.push((id, callback));
        Ok(id)
    }

    fn remove_message_listener(&mut self, listener: ListenerId) -> HostResult<()> {
        let index = self
            .listeners
            .iter()
            .position(|(id, _)| *id == listener)
            .ok_or_else(|| HostError::ListenerRemoval {
                listener,
                reason: "not registered".into(),
            })?;
        let (_, callback) = self.listeners.remove(index);
        let result = self
            .window
            .remove_event_listener_with_callback("message", callback.as_ref().unchecked_ref())
            .map_err(|err| HostError::ListenerRemoval {
                listener,
                reason: describe(&err),
            });
        // A `close` message removes this listener from inside itself.
        callback.forget();
        result
    }
}

// ============================================================================
// Beacons
// ============================================================================

/// Fires beacons as image requests.
pub struct ImageBeacon {
    document: Document,
}

impl ImageBeacon {
    pub fn new() -> Result<Self, JsValue> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| JsValue::from_str("No document"))?;
        Ok(Self { document })
    }
}

impl BeaconSink for ImageBeacon {
    fn fire(&mut self, url: &Url) -> HostResult<()> {
        let image: HtmlImageElement = self
            .document
            .create_element("img")
            .and_then(|element| element.dyn_into::<HtmlImageElement>().map_err(JsValue::from))
            .map_err(|err| HostError::Beacon(describe(&err)))?;
        image.set_src(url.as_str());
        Ok(())
    }
}

// ============================================================================
// VPAID surface
// ============================================================================

fn parse_view_mode(raw: &str) -> ViewMode {
    raw.parse().unwrap_or_else(|err| {
        tracing::debug!(error = %err, "unknown view mode, using normal");
        ViewMode::Normal
    })
}

/// Arguments passed to a subscriber, per the VPAID event signatures.
fn event_args(event: &AdEvent) -> Array {
    let args = Array::new();
    match event {
        AdEvent::AdError { message } => {
            args.push(&JsValue::from_str(message));
        }
        AdEvent::AdClickThru {
            url,
            id,
            player_handles,
        } => {
            args.push(&JsValue::from_str(url));
            args.push(&JsValue::from_str(id));
            args.push(&JsValue::from_bool(*player_handles));
        }
        AdEvent::AdInteraction { id } => {
            args.push(&JsValue::from_str(id));
        }
        _ => {}
    }
    args
}

/// The object handed to the player.
#[wasm_bindgen]
pub struct VpaidAd {
    unit: AdUnit,
}

/// Entry point players look for on the creative's window.
#[wasm_bindgen(js_name = getVPAIDAd)]
pub fn get_vpaid_ad() -> VpaidAd {
    VpaidAd::with_config(UnitConfig::default())
}

/// Like `getVPAIDAd`, with a `UnitConfig` object (asset base, URLs, tracking).
#[wasm_bindgen(js_name = getVPAIDAdWithConfig)]
pub fn get_vpaid_ad_with_config(config: JsValue) -> Result<VpaidAd, JsValue> {
    let config: UnitConfig = serde_wasm_bindgen::from_value(config)?;
    Ok(VpaidAd::with_config(config))
}

impl VpaidAd {
    fn with_config(config: UnitConfig) -> Self {
        let unit = match ImageBeacon::new() {
            Ok(beacon) => AdUnit::with_beacon_sink(config, Box::new(beacon)),
            Err(err) => {
                tracing::warn!(error = %describe(&err), "beacons disabled");
                AdUnit::new(config)
            }
        };
        Self { unit }
    }
}

#[wasm_bindgen]
impl VpaidAd {
    #[wasm_bindgen(js_name = handshakeVersion)]
    pub fn handshake_version(&self, version: String) -> String {
        self.unit.handshake_version(&version).to_string()
    }

    #[wasm_bindgen(js_name = initAd)]
    pub fn init_ad(
        &self,
        width: u32,
        height: u32,
        view_mode: String,
        desired_bitrate: u32,
        creative_data: JsValue,
        environment_vars: JsValue,
    ) {
        let creative = CreativeData {
            ad_parameters: get(&creative_data, "AdParameters").and_then(|p| p.as_string()),
        };

        let mut environment = AdEnvironment::new();
        if let Some(slot) = get(&environment_vars, "slot").and_then(|s| s.dyn_into::<HtmlElement>().ok()) {
            match DomFrameContainer::new(slot) {
                Ok(container) => environment = environment.with_slot(Box::new(container)),
                Err(err) => tracing::warn!(error = %describe(&err), "slot unusable"),
            }
        }
        if let Some(video) = get(&environment_vars, "videoSlot")
            .and_then(|v| v.dyn_into::<HtmlMediaElement>().ok())
        {
            environment = environment.with_video_slot(Box::new(HtmlVideoMedia::new(video)));
        }

        self.unit.init_ad(
            width,
            height,
            parse_view_mode(&view_mode),
            desired_bitrate,
            &creative,
            environment,
        );
    }

    #[wasm_bindgen(js_name = startAd)]
    pub fn start_ad(&self) {
        self.unit.start_ad();
    }

    #[wasm_bindgen(js_name = stopAd)]
    pub fn stop_ad(&self) {
        self.unit.stop_ad();
    }

    #[wasm_bindgen(js_name = skipAd)]
    pub fn skip_ad(&self) {
        self.unit.skip_ad();
    }

    #[wasm_bindgen(js_name = resizeAd)]
    pub fn resize_ad(&self, width: u32, height: u32, view_mode: String) {
        self.unit.resize_ad(width, height, parse_view_mode(&view_mode));
    }

    #[wasm_bindgen(js_name = pauseAd)]
    pub fn pause_ad(&self) {
        self.unit.pause_ad();
    }

    #[wasm_bindgen(js_name = resumeAd)]
    pub fn resume_ad(&self) {
        self.unit.resume_ad();
    }

    #[wasm_bindgen(js_name = expandAd)]
    pub fn expand_ad(&self) {
        self.unit.expand_ad();
    }

    #[wasm_bindgen(js_name = collapseAd)]
    pub fn collapse_ad(&self) {
        self.unit.collapse_ad();
    }

    #[wasm_bindgen(js_name = getAdLinear)]
    pub fn get_ad_linear(&self) -> bool {
        self.unit.get_ad_linear()
    }

    #[wasm_bindgen(js_name = getAdWidth)]
    pub fn get_ad_width(&self) -> u32 {
        self.unit.get_ad_width()
    }

    #[wasm_bindgen(js_name = getAdHeight)]
    pub fn get_ad_height(&self) -> u32 {
        self.unit.get_ad_height()
    }

    #[wasm_bindgen(js_name = getAdExpanded)]
    pub fn get_ad_expanded(&self) -> bool {
        self.unit.get_ad_expanded()
    }

    #[wasm_bindgen(js_name = getAdSkippableState)]
    pub fn get_ad_skippable_state(&self) -> bool {
        self.unit.get_ad_skippable_state()
    }

    #[wasm_bindgen(js_name = getAdRemainingTime)]
    pub fn get_ad_remaining_time(&self) -> f64 {
        self.unit.get_ad_remaining_time()
    }

    #[wasm_bindgen(js_name = getAdDuration)]
    pub fn get_ad_duration(&self) -> f64 {
        self.unit.get_ad_duration()
    }

    #[wasm_bindgen(js_name = getAdVolume)]
    pub fn get_ad_volume(&self) -> f64 {
        self.unit.get_ad_volume()
    }

    #[wasm_bindgen(js_name = setAdVolume)]
    pub fn set_ad_volume(&self, value: f64) {
        self.unit.set_ad_volume(value);
    }

    #[wasm_bindgen(js_name = getAdCompanions)]
    pub fn get_ad_companions(&self) -> String {
        self.unit.get_ad_companions()
    }

    #[wasm_bindgen(js_name = getAdIcons)]
    pub fn get_ad_icons(&self) -> String {
        self.unit.get_ad_icons()
    }

    /// `callback` is invoked with `context` as `this`. Exceptions it throws
    /// are logged and go no further.
    pub fn subscribe(&self, callback: Function, event_name: String, context: JsValue) {
        let kind = match event_name.parse::<AdEventKind>() {
            Ok(kind) => kind,
            Err(err) => {
                tracing::debug!(error = %err, "subscribe ignored");
                return;
            }
        };
        self.unit.subscribe(kind, move |event| {
            if let Err(err) = callback.apply(&context, &event_args(event)) {
                tracing::warn!(event = %kind, error = %describe(&err), "subscriber threw");
            }
        });
    }

    pub fn unsubscribe(&self, event_name: String) {
        match event_name.parse::<AdEventKind>() {
            Ok(kind) => self.unit.unsubscribe(kind),
            Err(err) => tracing::debug!(error = %err, "unsubscribe ignored"),
        }
    }
}
