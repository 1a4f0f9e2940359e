//! Request handlers

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use image::{DynamicImage, RgbImage};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::types::*;
use crate::backend::traits::Capability;
use crate::codec::{self, base64};
use crate::error::{AppError, Result};
use crate::segmentation::{self, MaskCandidate};
use crate::AppState;

/// Liveness plus the load state of every model
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let registry = &state.registry;

    Json(HealthResponse {
        status: "healthy",
        models_loaded: ModelsLoaded {
            text2img: registry.is_available(Capability::TextToImage),
            sam: registry.is_available(Capability::Segmentation),
            clip: registry.is_available(Capability::Classification),
        },
        model_states: registry
            .snapshot()
            .into_iter()
            .map(|(capability, model_state)| (capability.as_str(), model_state))
            .collect(),
        inference: state.gate.stats(),
    })
}

/// Text-to-image generation
pub async fn generate(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>> {
    let Json(request) = payload?;
    let params = request.into_params()?;
    let model = state.registry.text2img().await?;

    info!(
        prompt = %params.prompt,
        width = params.width,
        height = params.height,
        steps = params.steps,
        seed = ?params.seed,
        "Generating image"
    );

    let job = params.clone();
    let image = state
        .gate
        .run(Capability::TextToImage, move || model.generate(&job))
        .await?;

    let png = codec::image::encode_png(&DynamicImage::ImageRgb8(image))?;
    let image_url = match &state.store {
        Some(store) => Some(store.save_png(&png).await?),
        None => None,
    };

    Ok(Json(GenerateResponse {
        image_base64: base64::create_data_url(&png, "png"),
        image_url,
        seed: params.seed.unwrap_or(0),
        prompt: params.prompt,
    }))
}

/// Automatic or point-guided segmentation
pub async fn segment(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SegmentRequest>, JsonRejection>,
) -> Result<Json<SegmentResponse>> {
    let Json(request) = payload?;
    let job = request.validate()?;
    let model = state.registry.segmentation().await?;

    let image = decode_off_thread(job.image).await?;
    let (width, height) = image.dimensions();
    let threshold = job.threshold;

    let candidates = match job.points {
        None => {
            info!(width, height, threshold, "Automatic segmentation");
            let raw = state
                .gate
                .run(Capability::Segmentation, move || model.generate_masks(&image))
                .await?;
            segmentation::automatic(raw, threshold, width, height)
        }
        Some(points) => {
            info!(width, height, threshold, points = points.len(), "Guided segmentation");
            let predicted = state
                .gate
                .run(Capability::Segmentation, move || model.predict(&image, &points))
                .await?;
            segmentation::guided(predicted, threshold)
        }
    };

    let masks = candidates
        .into_iter()
        .map(mask_response)
        .collect::<Result<Vec<_>>>()?;

    Ok(Json(SegmentResponse {
        masks,
        width,
        height,
    }))
}

/// Decode an uploaded image on the blocking pool, outside the inference gate
async fn decode_off_thread(encoded: String) -> Result<RgbImage> {
    tokio::task::spawn_blocking(move || codec::decode_image(&encoded))
        .await
        .map_err(|e| AppError::Internal(format!("image decode task failed: {}", e)))?
}

fn mask_response(candidate: MaskCandidate) -> Result<MaskResponse> {
    let mask_base64 = candidate
        .mask
        .as_ref()
        .map(codec::encode_mask)
        .transpose()?;

    Ok(MaskResponse {
        bbox: candidate.bbox,
        confidence: candidate.confidence,
        area: candidate.area,
        predicted_label: candidate.label,
        mask_base64,
        polygon_svg: None,
    })
}

/// Inpainting placeholder: validates the request and echoes the image back
pub async fn inpaint(
    payload: std::result::Result<Json<InpaintRequest>, JsonRejection>,
) -> Result<Json<InpaintResponse>> {
    let Json(request) = payload?;
    let image = request.validate()?;

    warn!("Inpainting is not implemented, returning the input image");

    Ok(Json(InpaintResponse {
        image_base64: image,
        image_url: None,
        placeholder: true,
        status: "not_implemented",
    }))
}

/// Zero-shot classification of an image against caller-supplied labels
pub async fn classify(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ClassifyRequest>, JsonRejection>,
) -> Result<Json<ClassifyResponse>> {
    let Json(request) = payload?;
    let (image, labels) = request.validate()?;
    let model = state.registry.classification().await?;
    let image = decode_off_thread(image).await?;

    let job_labels = labels.clone();
    let scores = state
        .gate
        .run(Capability::Classification, move || {
            model.classify(&image, &job_labels)
        })
        .await?;

    let predictions = labels
        .into_iter()
        .zip(scores)
        .map(|(label, score)| Prediction { label, score })
        .collect::<Vec<_>>();
    let best = predictions
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .cloned();

    Ok(Json(ClassifyResponse { predictions, best }))
}
