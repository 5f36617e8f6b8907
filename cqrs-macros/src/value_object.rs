use crate::utils::apply_derives;
use proc_macro::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Item, LitBool, parse_macro_input};

/// #[value_object] 宏实现
/// - 支持结构体（具名或 tuple）与枚举
/// - 参数：`debug = true|false`（默认 true）、`copy`、`ordered`
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut derive_debug = true;
    let mut copy = false;
    let mut ordered = false;

    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("debug") {
            let lit: LitBool = meta.value()?.parse()?;
            derive_debug = lit.value();
            Ok(())
        } else if meta.path.is_ident("copy") {
            copy = true;
            Ok(())
        } else if meta.path.is_ident("ordered") {
            ordered = true;
            Ok(())
        } else {
            Err(meta.error("unknown key in attribute; expected 'debug', 'copy' or 'ordered'"))
        }
    });
    parse_macro_input!(attr with parser);

    let mut input = parse_macro_input!(item as Item);

    let mut required: Vec<syn::Path> = vec![
        syn::parse_quote!(Default),
        syn::parse_quote!(Clone),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
        syn::parse_quote!(PartialEq),
        syn::parse_quote!(Eq),
    ];
    if derive_debug {
        required.insert(0, syn::parse_quote!(Debug));
    }
    if copy {
        required.push(syn::parse_quote!(Copy));
    }
    if ordered {
        required.push(syn::parse_quote!(PartialOrd));
        required.push(syn::parse_quote!(Ord));
        required.push(syn::parse_quote!(Hash));
    }

    match &mut input {
        Item::Struct(st) => {
            apply_derives(&mut st.attrs, required);
            TokenStream::from(quote! { #st })
        }
        Item::Enum(en) => {
            apply_derives(&mut en.attrs, required);
            TokenStream::from(quote! { #en })
        }
        other => syn::Error::new(other.span(), "#[value_object] only supports struct or enum")
            .to_compile_error()
            .into(),
    }
}
