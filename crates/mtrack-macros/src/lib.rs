use proc_macro::TokenStream;
use quote::quote;
use syn::parse::Parser;
use syn::{parse_macro_input, ItemFn, LitInt, LitStr};

#[derive(Clone, Copy)]
enum Format {
    Table,
    Json,
    JsonPretty,
}

impl Format {
    fn to_tokens(self) -> proc_macro2::TokenStream {
        match self {
            Format::Table => quote!(mtrack::Format::Table),
            Format::Json => quote!(mtrack::Format::Json),
            Format::JsonPretty => quote!(mtrack::Format::JsonPretty),
        }
    }
}

/// Starts allocation tracking for the annotated function and prints the leak report when it returns.
///
/// The macro creates an `mtrack` guard at the top of the function body. Every
/// `mtrack::malloc!`, `mtrack::calloc!`, `mtrack::realloc!` and `mtrack::free!`
/// call made while the guard is alive is recorded. When the function returns the
/// guard is dropped, the report (counters, leaks, full allocation table) is
/// printed and the tracking table is released.
///
/// # Parameters
///
/// * `capacity` - Fixed number of records the table may hold. Allocations made
///   once the table is full stay untracked. Default: unbounded.
/// * `format` - Report format: `"table"` (default), `"json"` or `"json-pretty"`
///
/// # Examples
///
/// ```rust,no_run
/// #[mtrack::main]
/// fn main() {
///     let block = mtrack::malloc!(64);
///     unsafe { mtrack::free!(block) };
/// }
/// ```
///
/// Bounded table with JSON output:
///
/// ```rust,no_run
/// #[mtrack::main(capacity = 2048, format = "json-pretty")]
/// fn main() {
///     // Your code here
/// }
/// ```
///
/// # Limitations
///
/// The report runs when the guard is dropped. `std::process::exit` skips
/// destructors; use `GuardBuilder::install_at_exit` for programs that exit that way.
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    if cfg!(feature = "mtrack-off") {
        return item;
    }

    let input = parse_macro_input!(item as ItemFn);
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;

    let mut capacity: Option<usize> = None;
    let mut format = Format::Table;

    if !attr.is_empty() {
        let parser = syn::meta::parser(|meta| {
            if meta.path.is_ident("capacity") {
                meta.input.parse::<syn::Token![=]>()?;
                let li: LitInt = meta.input.parse()?;
                let value: usize = li.base10_parse()?;
                if value == 0 {
                    return Err(meta.error("capacity must be greater than 0"));
                }
                capacity = Some(value);
                return Ok(());
            }

            if meta.path.is_ident("format") {
                meta.input.parse::<syn::Token![=]>()?;
                let lit: LitStr = meta.input.parse()?;
                format =
                    match lit.value().as_str() {
                        "table" => Format::Table,
                        "json" => Format::Json,
                        "json-pretty" => Format::JsonPretty,
                        other => return Err(meta.error(format!(
                            "Unknown format {:?}. Expected one of: \"table\", \"json\", \"json-pretty\"",
                            other
                        ))),
                    };
                return Ok(());
            }

            Err(meta.error("Unknown parameter. Supported: capacity=N, format=\"..\""))
        });

        if let Err(e) = parser.parse2(proc_macro2::TokenStream::from(attr)) {
            return e.to_compile_error().into();
        }
    }

    let format_token = format.to_tokens();
    let capacity_token = match capacity {
        Some(n) => quote!(mtrack::Capacity::Bounded(#n)),
        None => quote!(mtrack::Capacity::Unbounded),
    };

    let asyncness = sig.asyncness.is_some();
    let fn_name = &sig.ident;

    let body = quote! {
        let _mtrack = {
            let caller_name: &'static str =
                concat!(module_path!(), "::", stringify!(#fn_name));

            mtrack::GuardBuilder::new(caller_name)
                .capacity(#capacity_token)
                .format(#format_token)
                .build()
        };
        #block
    };

    let wrapped_body = if asyncness {
        quote! { async { #body }.await }
    } else {
        body
    };

    let output = quote! {
        #vis #sig {
            #wrapped_body
        }
    };

    output.into()
}
