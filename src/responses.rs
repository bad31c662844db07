use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Success envelope: the payload's fields merged with `"ok": true`.
pub struct ApiOk<T>(pub T);

#[derive(Serialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(flatten)]
    data: T,
}

impl<T: Serialize> IntoResponse for ApiOk<T> {
    fn into_response(self) -> Response {
        Json(Envelope {
            ok: true,
            data: self.0,
        })
        .into_response()
    }
}
