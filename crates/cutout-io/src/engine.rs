//! Bindings to the JavaScript segmentation engine.
//!
//! The engine is any JS object exposing `initSegmentation()`,
//! `precomputeEmbedding(image)` and `createSession(image)`. Sessions expose
//! `addClick(x, y, type)`, `removeLastClick()`, `reset()`, `segment(image)`
//! and `dispose()`. Images cross the boundary as `ImageData`; masks come
//! back as `{ width, height, data }`. Async methods may return a plain
//! value or a `Promise`.

use cutout_core::{
    Click, MaskError, PixelMask, RgbaImage, SegmentationEngine, SegmentationSession, Segmenter,
    open_segmenter,
};
use futures::future::{self, FutureExt, LocalBoxFuture};
use js_sys::{Array, Function, Promise, Reflect};
use tracing::{debug, warn};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

use crate::raster::{RasterError, raster_to_image_data};
use crate::spawner::BrowserSpawner;

/// Errors from calls into the JS engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No engine object at the requested global name.
    #[error("no segmentation engine at `globalThis.{0}`")]
    MissingEngine(String),

    /// The engine or session object lacks a required method.
    #[error("engine object has no method `{0}`")]
    MissingMethod(String),

    /// `segment` resolved to something that is not a mask.
    #[error("malformed mask from engine: {0}")]
    MalformedMask(String),

    /// The mask's byte length does not match its dimensions.
    #[error(transparent)]
    Mask(#[from] MaskError),

    /// The image could not be handed to the engine.
    #[error(transparent)]
    Raster(#[from] RasterError),

    /// A JS call threw or its promise rejected.
    #[error("browser API error: {0}")]
    JsError(String),
}

impl From<JsValue> for EngineError {
    fn from(value: JsValue) -> Self {
        Self::JsError(format!("{value:?}"))
    }
}

/// Look up `name` on `target` as a callable.
fn method(target: &JsValue, name: &str) -> Result<Function, EngineError> {
    Reflect::get(target, &JsValue::from_str(name))?
        .dyn_into::<Function>()
        .map_err(|_| EngineError::MissingMethod(name.to_owned()))
}

/// Call `target[name](...args)` synchronously.
fn call(target: &JsValue, name: &str, args: &[JsValue]) -> Result<JsValue, EngineError> {
    let args: Array = args.iter().collect();
    Ok(method(target, name)?.apply(target, &args)?)
}

/// Call `target[name](...args)` now and await whatever it returns.
fn call_async(
    target: &JsValue,
    name: &str,
    args: &[JsValue],
) -> LocalBoxFuture<'static, Result<JsValue, EngineError>> {
    match call(target, name, args) {
        Ok(value) => async move { Ok(JsFuture::from(Promise::resolve(&value)).await?) }.boxed_local(),
        Err(err) => future::ready(Err(err)).boxed_local(),
    }
}

/// Convert a resolved `{ width, height, data }` object into a mask.
fn mask_from_js(value: &JsValue) -> Result<PixelMask, EngineError> {
    if !value.is_object() {
        return Err(EngineError::MalformedMask(format!("expected an object, got {value:?}")));
    }
    let width = Reflect::get(value, &JsValue::from_str("width"))?.as_f64();
    let height = Reflect::get(value, &JsValue::from_str("height"))?.as_f64();
    let data = Reflect::get(value, &JsValue::from_str("data"))?;
    if !data.is_object() {
        return Err(EngineError::MalformedMask("missing pixel data".into()));
    }
    // Copies out of a Uint8ClampedArray, Uint8Array or plain array alike.
    let bytes = js_sys::Uint8Array::new(&data).to_vec();
    mask_from_parts(width, height, bytes)
}

fn mask_from_parts(
    width: Option<f64>,
    height: Option<f64>,
    data: Vec<u8>,
) -> Result<PixelMask, EngineError> {
    let width = pixel_count(width, "width")?;
    let height = pixel_count(height, "height")?;
    Ok(PixelMask::from_raw(width, height, data)?)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::float_cmp
)]
fn pixel_count(value: Option<f64>, name: &str) -> Result<u32, EngineError> {
    match value {
        Some(v) if v.trunc() == v && (0.0..=f64::from(u32::MAX)).contains(&v) => Ok(v as u32),
        _ => Err(EngineError::MalformedMask(format!(
            "{name} is not a pixel count: {value:?}"
        ))),
    }
}

/// The JS engine object.
#[derive(Debug, Clone)]
pub struct JsSegmentationEngine {
    inner: JsValue,
}

impl JsSegmentationEngine {
    /// Wrap an engine object.
    #[must_use]
    pub const fn new(engine: JsValue) -> Self {
        Self { inner: engine }
    }

    /// Use the engine installed at `globalThis[name]`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingEngine`] if the global is unset.
    pub fn from_global(name: &str) -> Result<Self, EngineError> {
        let value = Reflect::get(&js_sys::global(), &JsValue::from_str(name))?;
        if value.is_undefined() || value.is_null() {
            return Err(EngineError::MissingEngine(name.to_owned()));
        }
        Ok(Self::new(value))
    }
}

impl SegmentationEngine for JsSegmentationEngine {
    type Session = JsSegmentationSession;
    type Error = EngineError;

    fn init(&self) -> LocalBoxFuture<'static, Result<(), EngineError>> {
        call_async(&self.inner, "initSegmentation", &[])
            .map(|result| result.map(|_| ()))
            .boxed_local()
    }

    fn precompute_embedding(
        &self,
        image: &RgbaImage,
    ) -> LocalBoxFuture<'static, Result<(), EngineError>> {
        let data = match raster_to_image_data(image) {
            Ok(data) => data,
            Err(err) => return future::ready(Err(err.into())).boxed_local(),
        };
        call_async(&self.inner, "precomputeEmbedding", &[data.into()])
            .map(|result| result.map(|_| ()))
            .boxed_local()
    }

    fn create_session(&self, image: &RgbaImage) -> Result<JsSegmentationSession, EngineError> {
        let data = raster_to_image_data(image)?;
        let session = call(&self.inner, "createSession", &[data.into()])?;
        if !session.is_object() {
            return Err(EngineError::JsError(format!(
                "createSession returned {session:?}"
            )));
        }
        debug!(
            width = image.width(),
            height = image.height(),
            "segmentation session created"
        );
        Ok(JsSegmentationSession { inner: session })
    }
}

/// A JS session object for one image.
#[derive(Debug)]
pub struct JsSegmentationSession {
    inner: JsValue,
}

impl JsSegmentationSession {
    fn invoke(&self, name: &str, args: &[JsValue]) -> Result<(), EngineError> {
        call(&self.inner, name, args).map(|_| ()).inspect_err(|err| {
            warn!(method = name, %err, "segmentation session call failed");
        })
    }
}

impl SegmentationSession for JsSegmentationSession {
    type Error = EngineError;

    fn add_click(&self, click: Click) -> Result<(), EngineError> {
        self.invoke(
            "addClick",
            &[
                JsValue::from_f64(click.x),
                JsValue::from_f64(click.y),
                JsValue::from_str(click.kind.as_str()),
            ],
        )
    }

    fn remove_last_click(&self) -> Result<(), EngineError> {
        self.invoke("removeLastClick", &[])
    }

    fn reset(&self) -> Result<(), EngineError> {
        self.invoke("reset", &[])
    }

    fn segment(&self, image: &RgbaImage) -> LocalBoxFuture<'static, Result<PixelMask, EngineError>> {
        let data = match raster_to_image_data(image) {
            Ok(data) => data,
            Err(err) => return future::ready(Err(err.into())).boxed_local(),
        };
        call_async(&self.inner, "segment", &[data.into()])
            .map(|result| result.and_then(|value| mask_from_js(&value)))
            .boxed_local()
    }

    fn dispose(&self) {
        debug!("segmentation session disposed");
        let _ = self.invoke("dispose", &[]);
    }
}

/// A segmenter bound to the JS engine.
pub type BrowserSegmenter = Segmenter<JsSegmentationSession>;

/// Initialize `engine`, embed `image`, and return a segmenter whose runs
/// are driven by the browser event loop.
///
/// # Errors
///
/// Returns the first [`EngineError`] from setup.
#[allow(clippy::future_not_send)] // JsValue is !Send
pub async fn open_browser_segmenter(
    engine: &JsSegmentationEngine,
    image: RgbaImage,
) -> Result<BrowserSegmenter, EngineError> {
    open_segmenter(engine, image, BrowserSpawner::shared()).await
}
