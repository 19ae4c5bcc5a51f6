use proc_macro::TokenStream;
use quote::quote;

pub fn impl_deser_macro(ast: &syn::DeriveInput) -> TokenStream {
    let name = ast.ident.clone();
    let data = match ast.data {
        syn::Data::Struct(ref data) => data,
        _ => panic!("CashDeserialize can only be derived for structs; implement enums by hand"),
    };
    let is_tuple_struct = matches!(data.fields, syn::Fields::Unnamed(_));
    let statements: Vec<proc_macro2::TokenStream> =
        data.fields.iter().map(deserialize_field).collect();

    let expanded = if is_tuple_struct {
        quote! {
            impl CashDeserialize for #name {
                fn cash_deserialize<R: std::io::Read>(mut target: R) -> Result<Self, SerializationError>
                {
                    Ok(#name (
                        #(#statements)*
                    ))
                }
            }
        }
    } else {
        quote! {
            impl CashDeserialize for #name {
                fn cash_deserialize<R: std::io::Read>(mut target: R) -> Result<Self, SerializationError>
                {
                    Ok(#name {
                        #(#statements)*
                    })
                }
            }
        }
    };

    TokenStream::from(expanded)
}

fn deserialize_field(field: &syn::Field) -> proc_macro2::TokenStream {
    let ty = field.ty.clone();
    match field.ident.clone() {
        Some(name) => {
            quote! { #name: <#ty as CashDeserialize>::cash_deserialize(&mut target)?, }
        }
        None => {
            quote! { <#ty as CashDeserialize>::cash_deserialize(&mut target)?, }
        }
    }
}
