/// Build a `StrError` using `format!` syntax
#[macro_export]
macro_rules! se {
    ($($arg:tt)*) => {
        $crate::StrError(format!($($arg)*))
    };
}

/// Build a tide response
///
/// - `resp!(json => value)` serializes `value` as the json body
/// - `resp!(redirect => url)` a temporary redirect
#[macro_export]
macro_rules! resp {
    (json => $obj:expr) => {{
        let body = serde_json::to_value(&$obj).map_err(|e| $crate::se!("json error {}", e))?;
        tide::Response::builder(200).body(body).build()
    }};
    (redirect => $url:expr) => {{
        let resp: tide::Response = tide::Redirect::new($url).into();
        resp
    }};
}
