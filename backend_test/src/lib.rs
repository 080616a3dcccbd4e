use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one and inject dependencies.
/// Every test gets its own server over fresh in-memory storage.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// [`crate::engine::Engine`], and [`crate::clock::ManualClock`], which drives
/// the server's notion of time.
///
/// An optional argument walks the client through the voting flow first:
/// `voter` registers and signs in, `consented` additionally consents to the
/// current policy, and `enrolled` additionally enrolls a fingerprint.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract injected arguments and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    let stage = match parse_macro_input!(args as Option<Ident>) {
        None => 0,
        Some(arg) if arg == "voter" => 1,
        Some(arg) if arg == "consented" => 2,
        Some(arg) if arg == "enrolled" => 3,
        Some(arg) => {
            return syn::Error::new(
                arg.span(),
                "Expected one of `voter`, `consented` or `enrolled`",
            )
            .into_compile_error()
            .into();
        }
    };

    let register = quote! {
        let response = rocket_client
            .post("/api/auth/register")
            .header(rocket::http::ContentType::JSON)
            .body(rocket::serde::json::json!(crate::model::voter::Registration::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), rocket::http::Status::Ok, "test setup failed to register");
    };
    let consent = quote! {
        let response = rocket_client
            .post("/api/consent")
            .header(rocket::http::ContentType::JSON)
            .body("{}")
            .dispatch()
            .await;
        assert_eq!(response.status(), rocket::http::Status::Ok, "test setup failed to consent");
    };
    let enroll = quote! {
        let response = rocket_client
            .post("/api/enroll")
            .header(rocket::http::ContentType::JSON)
            .body(rocket::serde::json::json!(crate::model::api::EnrollRequest::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), rocket::http::Status::Ok, "test setup failed to enroll");
    };
    let steps = [register, consent, enroll];
    let login = &steps[..stage];

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup(
                clock: crate::clock::ManualClock,
            ) -> (rocket::local::asynchronous::Client, crate::engine::Engine) {
                let rocket_client = rocket::local::asynchronous::Client::tracked(crate::rocket_for_test(clock))
                    .await
                    .unwrap();
                let engine = rocket_client
                    .rocket()
                    .state::<crate::engine::Engine>()
                    .unwrap()
                    .clone();

                // Each step in its own block, so no response outlives the client.
                #({ #login })*

                (rocket_client, engine)
            }

            /// The test itself.
            #item_fn

            log4rs_test_utils::test_logging::init_logging_once_for(["ballot_engine"], None, None);

            // Concurrency tests need more than one worker.
            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            let clock = crate::clock::ManualClock::example();
            runtime.block_on(async move {
                let (rocket_client, engine) = setup(clock.clone()).await;
                let _ = (&rocket_client, &engine);
                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut args = vec![];
    let mut seen: Vec<String> = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                // Valid as the last path segment for any type is itself.
                if let Some(segment) = type_path.path.segments.last() {
                    let type_name = segment.ident.to_string();
                    let injected = match type_name.as_str() {
                        "Client" => Some(quote! { rocket_client }),
                        "Engine" => Some(quote! { engine.clone() }),
                        "ManualClock" => Some(quote! { clock.clone() }),
                        _ => None,
                    };
                    if let Some(injected) = injected {
                        if seen.contains(&type_name) {
                            return Err(syn::Error::new(
                                input.span(),
                                format!("Test cannot accept more than one `{type_name}`"),
                            ));
                        }
                        seen.push(type_name);
                        args.push(injected);
                        continue;
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client`, `engine_ident: Engine` or `clock_ident: ManualClock`",
        ));
    }

    Ok(args)
}
