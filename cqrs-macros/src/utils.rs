use quote::ToTokens;
use syn::{Attribute, Field, FieldsNamed, Token, Type, punctuated::Punctuated};

// 拆分 derive 与其他属性
fn split_derives(attrs: &[Attribute]) -> (Vec<Attribute>, Vec<syn::Path>) {
    let mut retained = Vec::new();
    let mut existing = Vec::new();

    for attr in attrs {
        if !attr.path().is_ident("derive") {
            retained.push(attr.clone());
            continue;
        }

        if let Ok(list) =
            attr.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
        {
            existing.extend(list);
        }
    }

    (retained, existing)
}

// Serialize 与 serde::Serialize 视为同一派生
fn derive_key(path: &syn::Path) -> String {
    match path.segments.last() {
        Some(last) => {
            let ident = last.ident.to_string();
            match ident.as_str() {
                "Serialize" | "Deserialize" => format!("serde::{ident}"),
                _ => ident,
            }
        }
        None => path.to_token_stream().to_string(),
    }
}

/// 把必需派生与已有派生合并为单个 `#[derive(..)]`，必需项在前且去重
pub(crate) fn apply_derives(attrs: &mut Vec<Attribute>, required: Vec<syn::Path>) {
    let (retained, existing) = split_derives(attrs);

    let mut seen = std::collections::HashSet::new();
    let merged: Vec<syn::Path> = required
        .into_iter()
        .chain(existing)
        .filter(|p| seen.insert(derive_key(p)))
        .collect();

    let derive: Attribute = syn::parse_quote!(#[derive(#(#merged),*)]);
    *attrs = std::iter::once(derive).chain(retained).collect();
}

/// 确保具名字段中包含 `name: ty`，缺失时插入到最前；已存在则移动到最前
pub(crate) fn ensure_leading_field(fields: &mut FieldsNamed, name: &str, ty: &Type) {
    let ident = syn::Ident::new(name, proc_macro2::Span::call_site());

    let mut leading: Option<Field> = None;
    let mut rest: Punctuated<Field, Token![,]> = Punctuated::new();

    for field in fields.named.iter() {
        let is_target = field.ident.as_ref().is_some_and(|i| *i == ident);
        if is_target && leading.is_none() {
            leading = Some(field.clone());
        } else {
            rest.push(field.clone());
        }
    }

    let leading = leading.unwrap_or_else(|| syn::parse_quote! { #ident: #ty });

    let mut named: Punctuated<Field, Token![,]> = Punctuated::new();
    named.push(leading);
    named.extend(rest);
    fields.named = named;
}
