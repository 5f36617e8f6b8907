use crate::utils::{apply_derives, ensure_leading_field};
use proc_macro::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Item, LitBool, Type, parse_macro_input};

/// #[entity] 宏实现
///
/// 版本号由 `AggregateRoot` 维护，聚合状态本身只携带标识。
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut id_ty: Option<Type> = None;
    let mut derive_debug = true;

    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("id") {
            if id_ty.is_some() {
                return Err(meta.error("duplicate key 'id' in attribute"));
            }
            id_ty = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("debug") {
            let lit: LitBool = meta.value()?.parse()?;
            derive_debug = lit.value();
            Ok(())
        } else {
            Err(meta.error("unknown key in attribute; expected 'id' or 'debug'"))
        }
    });
    parse_macro_input!(attr with parser);

    let mut st = match parse_macro_input!(item as Item) {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[entity] only on struct")
                .to_compile_error()
                .into();
        }
    };

    let fields = match &mut st.fields {
        syn::Fields::Named(f) => f,
        _ => {
            return syn::Error::new(st.span(), "#[entity] only supports named-field struct")
                .to_compile_error()
                .into();
        }
    };

    let id_ty = id_ty.unwrap_or_else(|| syn::parse_quote! { String });
    ensure_leading_field(fields, "id", &id_ty);

    let mut required: Vec<syn::Path> = vec![
        syn::parse_quote!(Clone),
        syn::parse_quote!(Default),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];
    if derive_debug {
        required.insert(0, syn::parse_quote!(Debug));
    }
    apply_derives(&mut st.attrs, required);

    let ident = &st.ident;
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    let expanded = quote! {
        #st

        impl #impl_generics ::cqrs_domain::entity::Entity for #ident #ty_generics #where_clause {
            type Id = #id_ty;

            fn new(id: Self::Id) -> Self {
                Self { id, ..::core::default::Default::default() }
            }

            fn id(&self) -> &Self::Id {
                &self.id
            }
        }
    };

    TokenStream::from(expanded)
}
