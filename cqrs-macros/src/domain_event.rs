use crate::utils::apply_derives;
use proc_macro::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Fields, Item, LitInt, LitStr, parse_macro_input};

/// #[domain_event] 宏实现
///
/// 事件的聚合版本由所在的 `EventBatch` 决定，这里只生成类型名与载荷版本。
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut default_version: Option<LitInt> = None;

    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("version") {
            default_version = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unknown key in attribute; expected 'version'"))
        }
    });
    parse_macro_input!(attr with parser);

    let mut enum_item = match parse_macro_input!(item as Item) {
        Item::Enum(e) => e,
        other => {
            return syn::Error::new(other.span(), "#[domain_event] can only be used on enum types")
                .to_compile_error()
                .into();
        }
    };

    if enum_item.variants.is_empty() {
        return syn::Error::new(enum_item.span(), "#[domain_event] requires at least one variant")
            .to_compile_error()
            .into();
    }

    apply_derives(
        &mut enum_item.attrs,
        vec![
            syn::parse_quote!(Debug),
            syn::parse_quote!(Clone),
            syn::parse_quote!(PartialEq),
            syn::parse_quote!(serde::Serialize),
            syn::parse_quote!(serde::Deserialize),
        ],
    );

    let default_version = default_version.unwrap_or_else(|| syn::parse_quote! { 1 });
    let enum_name = enum_item.ident.to_string();

    let mut type_arms = Vec::with_capacity(enum_item.variants.len());
    let mut version_arms = Vec::with_capacity(enum_item.variants.len());

    for variant in enum_item.variants.iter_mut() {
        let mut event_type: Option<LitStr> = None;
        let mut event_version: Option<LitInt> = None;
        let mut retained = Vec::with_capacity(variant.attrs.len());

        for attr in variant.attrs.iter() {
            if !attr.path().is_ident("event") {
                retained.push(attr.clone());
                continue;
            }

            let parsed = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("event_type") {
                    if event_type.is_some() {
                        return Err(meta.error("duplicate 'event_type' specified for this variant"));
                    }
                    event_type = Some(meta.value()?.parse()?);
                    Ok(())
                } else if meta.path.is_ident("event_version") {
                    if event_version.is_some() {
                        return Err(
                            meta.error("duplicate 'event_version' specified for this variant")
                        );
                    }
                    event_version = Some(meta.value()?.parse()?);
                    Ok(())
                } else {
                    Err(meta.error("expected 'event_type' or 'event_version'"))
                }
            });

            if let Err(err) = parsed {
                return err.to_compile_error().into();
            }
        }
        variant.attrs = retained;

        let v_ident = &variant.ident;
        let pattern = match &variant.fields {
            Fields::Named(_) => quote! { Self::#v_ident { .. } },
            Fields::Unnamed(_) => quote! { Self::#v_ident(..) },
            Fields::Unit => quote! { Self::#v_ident },
        };

        let event_type = event_type
            .unwrap_or_else(|| LitStr::new(&format!("{enum_name}.{v_ident}"), v_ident.span()));
        let event_version = event_version.unwrap_or_else(|| default_version.clone());

        type_arms.push(quote! { #pattern => #event_type });
        version_arms.push(quote! { #pattern => #event_version });
    }

    let ident = &enum_item.ident;
    let (impl_generics, ty_generics, where_clause) = enum_item.generics.split_for_impl();

    let expanded = quote! {
        #enum_item

        impl #impl_generics ::cqrs_domain::domain_event::DomainEvent for #ident #ty_generics #where_clause {
            fn event_type(&self) -> &str {
                match self {
                    #(#type_arms,)*
                }
            }

            fn event_version(&self) -> usize {
                match self {
                    #(#version_arms,)*
                }
            }
        }
    };

    TokenStream::from(expanded)
}
