//! Derive macros for the consensus wire format traits.
//!
//! `CashSerialize` and `CashDeserialize` can be derived for structs whose
//! fields all implement the corresponding trait; fields are written in
//! declaration order, which is what makes the derive safe for
//! consensus-critical types. Enums carry wire tags that are not expressible
//! field-by-field, so they must implement the traits by hand.
extern crate proc_macro;
use proc_macro::TokenStream;

mod deserialize;
mod serialize;

#[proc_macro_derive(CashSerialize)]
pub fn serializable(input: TokenStream) -> TokenStream {
    let ast = syn::parse(input).unwrap();
    serialize::impl_ser_macro(&ast)
}

#[proc_macro_derive(CashDeserialize)]
pub fn deserializable(input: TokenStream) -> TokenStream {
    let ast = syn::parse(input).unwrap();
    deserialize::impl_deser_macro(&ast)
}
