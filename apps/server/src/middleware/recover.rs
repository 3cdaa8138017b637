use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::ContentType,
    Error, HttpResponse,
};
use futures_util::FutureExt;
use std::future::{ready, Ready};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::rc::Rc;

use crate::error::panic_message;

/// Turns a panic anywhere in the wrapped service into a plain 500 response.
///
/// The panic is logged together with the request method and path; the
/// worker keeps serving other requests.
pub struct CatchPanic;

impl<S, B> Transform<S, ServiceRequest> for CatchPanic
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = CatchPanicMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CatchPanicMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct CatchPanicMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for CatchPanicMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let http_req = req.request().clone();
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            // Calling inside the future so a panic while building the
            // handler future is caught as well.
            let outcome = AssertUnwindSafe(async move { service.call(req).await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(result) => result.map(|res| res.map_into_left_body()),
                Err(panic) => {
                    log::error!(
                        "Panic while handling {} {}: {}",
                        http_req.method(),
                        http_req.path(),
                        panic_message(panic.as_ref())
                    );
                    let response = HttpResponse::InternalServerError()
                        .content_type(ContentType::plaintext())
                        .body("Internal Server Error")
                        .map_into_boxed_body();
                    Ok(ServiceResponse::new(http_req, response).map_into_right_body())
                }
            }
        })
    }
}
