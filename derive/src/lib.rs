use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse_macro_input, parse_quote, Data, DataStruct, DeriveInput, Fields, GenericParam, Generics,
    Index, Member,
};

#[proc_macro_derive(Shape)]
pub fn shape(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;
    let generics = add_field(input.generics);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let members: Vec<(Member, &syn::Type)> = match input.data {
        Data::Struct(DataStruct {
            fields: Fields::Named(ref fields),
            ..
        }) => fields
            .named
            .iter()
            .filter_map(|field| {
                field
                    .ident
                    .clone()
                    .map(|ident| (Member::Named(ident), &field.ty))
            })
            .collect(),
        Data::Struct(DataStruct {
            fields: Fields::Unnamed(ref fields),
            ..
        }) => fields
            .unnamed
            .iter()
            .enumerate()
            .map(|(i, field)| (Member::Unnamed(Index::from(i)), &field.ty))
            .collect(),
        Data::Struct(DataStruct {
            fields: Fields::Unit,
            ..
        }) => vec![],
        _ => {
            return syn::Error::new(name.span(), "#[derive(Shape)] is only implemented for structs")
                .to_compile_error()
                .into()
        }
    };

    let describe_body = members.iter().map(|(member, ty)| {
        quote! {
            <#ty as sandpool::Field>::describe(
                builder,
                offset + ::core::mem::offset_of!(Self, #member),
            );
        }
    });

    let expanded = quote! {
        #[automatically_derived]
        unsafe impl #impl_generics sandpool::Field for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn describe(builder: &mut sandpool::ShapeBuilder, offset: usize) {
                #(#describe_body)*
            }
        }

        #[automatically_derived]
        unsafe impl #impl_generics sandpool::Shape for #name #ty_generics #where_clause {}

        impl #impl_generics sandpool::__MustNotDrop for #name #ty_generics #where_clause {}
    };

    TokenStream::from(expanded)
}

// Every type parameter ends up in the payload, and descriptors are cached
// by TypeId.
fn add_field(mut generics: Generics) -> Generics {
    for param in &mut generics.params {
        if let GenericParam::Type(ref mut type_param) = *param {
            type_param.bounds.push(parse_quote!(sandpool::Field));
            type_param.bounds.push(parse_quote!('static));
        }
    }
    generics
}
