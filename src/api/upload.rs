use std::path::Path as FsPath;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use mongodb::bson::doc;
use mongodb::bson::oid::ObjectId;

use crate::api::bootcamps::{bootcamp_not_found, PUBLISHERS};
use crate::api::extract::parse_id;
use crate::api::response::ApiResponse;
use crate::app::AppState;
use crate::auth::middleware::AuthUser;
use crate::auth::models::AuthenticatedUser;
use crate::auth::policy::{ensure_owner, require_role};
use crate::db::bootcamp_repository::BootcampRepository;
use crate::error::AppError;
use crate::storage::client::StorageClient;

/// Multipart field carrying the photo.
pub const FILE_FIELD: &str = "file";

/// A file received from a multipart form.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Extension for the stored file, from the upload name or else the MIME subtype.
fn photo_extension(upload: &PhotoUpload) -> String {
    let from_name = upload
        .file_name
        .as_deref()
        .and_then(|name| FsPath::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let from_mime = || {
        upload
            .content_type
            .as_deref()
            .and_then(|mime| mime.split_once('/'))
            .map(|(_, subtype)| match subtype {
                "jpeg" => "jpg".to_string(),
                "svg+xml" => "svg".to_string(),
                other => other.to_ascii_lowercase(),
            })
    };

    from_name
        .or_else(from_mime)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

/// Name under which a bootcamp's photo is stored.
pub fn photo_file_name(bootcamp_id: &ObjectId, upload: &PhotoUpload) -> String {
    format!("photo_{}{}", bootcamp_id, photo_extension(upload))
}

/// Store an image for a bootcamp owned by the actor and record its file name.
pub async fn process_upload_photo(
    bootcamps: &dyn BootcampRepository,
    storage: &dyn StorageClient,
    actor: &AuthenticatedUser,
    id: ObjectId,
    upload: Option<PhotoUpload>,
    max_size: usize,
) -> Result<String, AppError> {
    require_role(actor, PUBLISHERS)?;

    let bootcamp = bootcamps
        .find_by_id(&id)
        .await?
        .ok_or_else(|| bootcamp_not_found(&id))?;
    ensure_owner(actor, &bootcamp.user, "update", "bootcamp", &id)?;

    let upload = upload.ok_or_else(|| AppError::BadRequest("Please upload a file".into()))?;

    let is_image = upload
        .content_type
        .as_deref()
        .is_some_and(|mime| mime.starts_with("image/"));
    if !is_image {
        return Err(AppError::BadRequest("Please upload an image file".into()));
    }

    if upload.data.len() > max_size {
        return Err(AppError::BadRequest(format!(
            "Please upload an image less than {max_size}"
        )));
    }

    let file_name = photo_file_name(&id, &upload);
    storage.put_object(&file_name, upload.data).await?;

    bootcamps
        .update(&id, doc! { "$set": { "photo": file_name.as_str() } })
        .await?
        .ok_or_else(|| bootcamp_not_found(&id))?;

    tracing::info!(bootcamp = %id, file = %file_name, "Photo uploaded");
    Ok(file_name)
}

/// First `file` field of the form, if any.
async fn read_photo(multipart: &mut Multipart) -> Result<Option<PhotoUpload>, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;

        return Ok(Some(PhotoUpload {
            file_name,
            content_type,
            data: data.to_vec(),
        }));
    }
    Ok(None)
}

/// `PUT /api/v1/bootcamps/{id}/photo`
pub async fn upload_photo_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse>, AppError> {
    let id = parse_id(&id)?;
    let upload = read_photo(&mut multipart).await?;

    let file_name = process_upload_photo(
        state.bootcamp_repo.as_ref(),
        state.storage_client.as_ref(),
        &actor,
        id,
        upload,
        state.settings.max_file_upload,
    )
    .await?;

    Ok(Json(ApiResponse::message(file_name)))
}
