use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{Ident, Item, LitStr, Path, meta::ParseNestedMeta, parse_quote};

/// Which catalog an attribute feeds.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Service,
    Factory,
    Module,
}

impl Kind {
    fn attr_name(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Factory => "factory",
            Self::Module => "module",
        }
    }

    fn static_prefix(self) -> &'static str {
        match self {
            Self::Service => "__ORCHESTRA_SERVICE",
            Self::Factory => "__ORCHESTRA_FACTORY",
            Self::Module => "__ORCHESTRA_MODULE",
        }
    }
}

/// Where the section record goes.
#[derive(Clone, Copy, PartialEq, Eq)]
enum RecordPath {
    StaticStr,
    CStr,
    None,
}

/// Parsed `#[service(...)]` / `#[factory(...)]` / `#[module(...)]` arguments.
pub struct Args {
    kind: Kind,
    name: Option<LitStr>,
    krate: Path,
    record: RecordPath,
}

impl Args {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            name: None,
            krate: parse_quote!(::orchestra_core),
            record: if kind == Kind::Service {
                RecordPath::StaticStr
            } else {
                RecordPath::None
            },
        }
    }

    pub fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("name") {
            let name: LitStr = meta.value()?.parse()?;
            if name.value().is_empty() || name.value().contains('\0') {
                return Err(meta.error("name must be non-empty and contain no NUL bytes"));
            }
            self.name = Some(name);
            return Ok(());
        }
        if meta.path.is_ident("crate") {
            self.krate = meta.value()?.parse()?;
            return Ok(());
        }
        if self.kind == Kind::Service {
            if meta.path.is_ident("cstr") {
                self.record = RecordPath::CStr;
                return Ok(());
            }
            if meta.path.is_ident("manual") {
                self.record = RecordPath::None;
                return Ok(());
            }
            return Err(meta.error(
                "unknown argument; expected `name = \"...\"`, `crate = path`, `cstr`, or `manual`",
            ));
        }
        Err(meta.error("unknown argument; expected `name = \"...\"` or `crate = path`"))
    }
}

/// Expands one registration attribute.
///
/// Leaves the item unchanged and appends `linkme` statics that add the type
/// to its catalog and, for services, to the identifier section.
pub fn expand(args: Args, item: Item) -> syn::Result<TokenStream> {
    let (ident, generics) = match &item {
        Item::Struct(s) => (&s.ident, &s.generics),
        Item::Enum(e) => (&e.ident, &e.generics),
        other => {
            return Err(syn::Error::new_spanned(
                other,
                format!(
                    "#[{}] can only be applied to a struct or an enum",
                    args.kind.attr_name()
                ),
            ));
        }
    };
    if !generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            generics,
            format!(
                "#[{}] types cannot be generic; register a concrete alias instead",
                args.kind.attr_name()
            ),
        ));
    }

    let krate = &args.krate;
    let upper = ident.to_string().to_uppercase();
    let entry_static = Ident::new(
        &format!("{}_{upper}", args.kind.static_prefix()),
        Span::call_site(),
    );
    let record_static = Ident::new(
        &format!("{}_RECORD_{upper}", args.kind.static_prefix()),
        Span::call_site(),
    );

    let name = match &args.name {
        Some(lit) => quote!(#lit),
        None => quote!(::core::concat!(
            ::core::env!("CARGO_CRATE_NAME"),
            ".",
            ::core::stringify!(#ident)
        )),
    };

    let (slice, entry_ty, handle_ty) = match args.kind {
        Kind::Service => (
            quote!(#krate::catalog::SERVICE_TYPES),
            quote!(#krate::catalog::ServiceTypeEntry),
            quote!(#krate::ServiceType),
        ),
        Kind::Factory => (
            quote!(#krate::catalog::FACTORY_TYPES),
            quote!(#krate::catalog::FactoryTypeEntry),
            quote!(#krate::FactoryType),
        ),
        Kind::Module => (
            quote!(#krate::catalog::MODULE_TYPES),
            quote!(#krate::catalog::ModuleEntry),
            quote!(#krate::ModuleType),
        ),
    };

    let record = match args.record {
        RecordPath::StaticStr => quote! {
            #[#krate::linkme::distributed_slice(#krate::section::ORCHESTRA_SVC)]
            #[linkme(crate = #krate::linkme)]
            #[doc(hidden)]
            static #record_static: #krate::section::StaticStrRecord =
                #krate::section::StaticStrRecord::new(#name);
        },
        RecordPath::CStr => quote! {
            #[#krate::linkme::distributed_slice(#krate::section::ORCHESTRA_CSVC)]
            #[linkme(crate = #krate::linkme)]
            #[doc(hidden)]
            static #record_static: #krate::section::CStrRecord =
                #krate::section::CStrRecord::from_bytes_with_nul(
                    ::core::concat!(#name, "\0").as_bytes()
                );
        },
        RecordPath::None => quote!(),
    };

    Ok(quote! {
        #item

        #[#krate::linkme::distributed_slice(#slice)]
        #[linkme(crate = #krate::linkme)]
        #[doc(hidden)]
        static #entry_static: #entry_ty = #entry_ty {
            name: #name,
            resolve: #handle_ty::of::<#ident>,
        };

        #record
    })
}
