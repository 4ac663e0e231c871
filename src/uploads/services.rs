use anyhow::Context;
use bytes::Bytes;
use uuid::Uuid;

use crate::{state::AppState, storage::resolve_filename};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub struct UploadItem<'a> {
    pub body: Bytes,
    pub content_type: &'a str,
}

pub(crate) fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Stores the image and points the user's `user_identifier_image_url` at it.
pub async fn upload_identifier_image(
    st: &AppState,
    user_id: i64,
    image: UploadItem<'_>,
) -> anyhow::Result<String> {
    let ext = ext_from_mime(image.content_type)
        .with_context(|| format!("unsupported content type {}", image.content_type))?;
    let key = resolve_filename(
        &format!("users/{}/identifier-{}", user_id, Uuid::new_v4()),
        &format!(".{}", ext),
    );

    st.storage
        .put_object(&key, image.body, image.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    let url = st.storage.public_url(&key);
    st.users
        .set_identifier_image_url(user_id, &url)
        .await
        .context("save identifier image url")?;
    Ok(url)
}
