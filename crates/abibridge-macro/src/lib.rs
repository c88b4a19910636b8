//! Procedural macro generating foreign-ABI adapters
//!
//! Provides:
//! - `#[foreign_interface(name = "...", versions(mod = "VERSION", ...))]` on a
//!   trait - generates descriptors, foreign vtables, thunks, native vtables,
//!   native-object glue and factories for every listed version
//!
//! ## Calling Conventions
//!
//! **Foreign vtables:**
//! - x86: `thiscall` (this in ECX)
//! - x64: `C` (this as first param)
//!
//! **Native vtables:** `C` everywhere
//!
//! ## Method attributes
//! - `#[sdk_name("GetSessionCount")]` - name recorded in the descriptor
//! - `#[hidden_return]` - aggregate result returned through a caller pointer
//! - `#[only(v002, ...)]` - method exists only in the listed versions
//! - `#[slot(N)]` - explicit slot index; skipped slots become reserved
//! - `#[returns_interface(version = param, table = path)]` - the returned
//!   pointer is a native interface; it is wrapped in the foreign handle for the
//!   version string in `param`, looked up in the table `path()` returns
//!
//! ## Parameter attributes
//! - `#[convert_pointee]` - on a `*const T`/`*mut T` parameter: the native
//!   side receives a pointer to a converted copy of the pointee, `*mut` copies
//!   are converted back after the call
//!
//! Records (`Marshal::KIND` is `Record`) are only returned through
//! `#[hidden_return]`; a by-value record return fails to compile.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    Attribute, FnArg, Ident, ItemTrait, LitInt, LitStr, Pat, Token, TraitItem, Type,
    parse_macro_input, punctuated::Punctuated, spanned::Spanned,
};

// =============================================================================
// Configuration
// =============================================================================

/// One entry of `versions(...)`
struct VersionSpec {
    /// Module the version's items are generated in (e.g. `v002`)
    module: Ident,
    /// SDK version string (e.g. `STEAMREMOTEPLAY_INTERFACE_VERSION002`)
    version: LitStr,
}

/// Arguments of `#[foreign_interface(...)]`
#[derive(Default)]
struct InterfaceConfig {
    /// SDK interface name, defaults to the trait name
    name: Option<LitStr>,
    versions: Vec<VersionSpec>,
}

/// A `#[convert_pointee]` parameter's pointee
struct Pointee {
    mutable: bool,
    elem: Type,
}

/// A parsed method parameter
struct ParamSpec {
    name: Ident,
    ty: Type,
    pointee: Option<Pointee>,
}

/// Arguments of `#[returns_interface(...)]`
struct ReturnsInterface {
    /// Parameter holding the version string
    version: Ident,
    /// Function returning the `ConstructorTable` to wrap with
    table: syn::Path,
}

/// A parsed trait method
struct MethodSpec {
    ident: Ident,
    sdk_name: String,
    receiver_mut: bool,
    params: Vec<ParamSpec>,
    output: Option<Type>,
    hidden_return: bool,
    returns_interface: Option<ReturnsInterface>,
    /// Versions the method is restricted to, `None` for all
    only: Option<Vec<Ident>>,
    slot: Option<usize>,
    /// Attributes passed through to the emitted trait (docs, cfgs)
    attrs: Vec<Attribute>,
}

/// What occupies one vtable slot in a given version
enum SlotEntry<'a> {
    Method(usize, &'a MethodSpec),
    Reserved(usize),
}

// =============================================================================
// Validation helpers for FFI-safety
// =============================================================================

/// Check if a type is known to be non-FFI-safe
fn check_ffi_safe_type(ty: &Type) -> Result<(), String> {
    match ty {
        Type::Path(type_path) => {
            if let Some(segment) = type_path.path.segments.last() {
                let name = segment.ident.to_string();
                match name.as_str() {
                    "String" => {
                        return Err(
                            "String is not FFI-safe. Use *const c_char or *const u8 instead".into(),
                        );
                    }
                    "Vec" => {
                        return Err(
                            "Vec<T> is not FFI-safe. Use *const T and a length parameter instead"
                                .into(),
                        );
                    }
                    "Box" => return Err("Box<T> is not FFI-safe. Use *mut T instead".into()),
                    "Rc" | "Arc" => {
                        return Err(format!(
                            "{} is not FFI-safe. Use raw pointers instead",
                            name
                        ));
                    }
                    "Option" if !is_nullable_pointer(segment) => {
                        return Err(
                            "Option<T> has no foreign representation. Use a raw pointer, Option<NonNull<T>> or Option<extern \"C\" fn> instead"
                                .into(),
                        );
                    }
                    "Result" => return Err(
                        "Result<T, E> is not FFI-safe. Native failures are plain return values"
                            .into(),
                    ),
                    "str" => {
                        return Err(
                            "str is not FFI-safe. Use *const c_char or *const u8 instead".into(),
                        );
                    }
                    _ => {}
                }
            }
        }
        Type::Reference(type_ref) => {
            let mutability = if type_ref.mutability.is_some() {
                "&mut "
            } else {
                "&"
            };
            return Err(format!(
                "{}T references cannot cross the foreign boundary. Use *const T or *mut T instead",
                mutability
            ));
        }
        Type::Slice(_) => {
            return Err(
                "Slices [T] are not FFI-safe. Use *const T and a length parameter instead".into(),
            );
        }
        Type::TraitObject(_) => {
            return Err("Trait objects (dyn Trait) are not FFI-safe".into());
        }
        Type::ImplTrait(_) => {
            return Err("impl Trait is not FFI-safe".into());
        }
        Type::Tuple(tuple) if !tuple.elems.is_empty() => {
            return Err(
                "Non-empty tuples are not FFI-safe. Use a #[repr(C)] struct instead".into(),
            );
        }
        _ => {}
    }
    Ok(())
}

/// `Option<NonNull<T>>` and `Option<extern fn>`, where `None` is the null pointer
fn is_nullable_pointer(segment: &syn::PathSegment) -> bool {
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return false;
    };
    if args.args.len() != 1 {
        return false;
    }
    match args.args.first() {
        Some(syn::GenericArgument::Type(Type::BareFn(bare))) => bare.abi.is_some(),
        Some(syn::GenericArgument::Type(Type::Path(inner))) => inner
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "NonNull"),
        _ => false,
    }
}

/// Validate a trait method signature for foreign vtable compatibility
fn validate_trait_method(method: &syn::TraitItemFn) -> Result<(), syn::Error> {
    let method_name = &method.sig.ident;
    let span = method_name.span();

    if method.sig.asyncness.is_some() {
        return Err(syn::Error::new(
            span,
            format!(
                "method '{}': async functions cannot be called through a vtable",
                method_name
            ),
        ));
    }

    if !method.sig.generics.params.is_empty() {
        return Err(syn::Error::new(
            span,
            format!(
                "method '{}': generic methods cannot occupy a vtable slot",
                method_name
            ),
        ));
    }

    if method.default.is_some() {
        return Err(syn::Error::new(
            span,
            format!(
                "method '{}': default bodies are not supported, the native side implements every method",
                method_name
            ),
        ));
    }

    let has_self = method
        .sig
        .inputs
        .iter()
        .any(|arg| matches!(arg, FnArg::Receiver(_)));
    if !has_self {
        return Err(syn::Error::new(
            span,
            format!(
                "method '{}': must have &self or &mut self parameter (every slot receives the handle)",
                method_name
            ),
        ));
    }

    for arg in &method.sig.inputs {
        if let FnArg::Receiver(receiver) = arg
            && receiver.reference.is_none()
        {
            return Err(syn::Error::new(
                receiver.self_token.span(),
                format!(
                    "method '{}': self by value is not supported. Use &self or &mut self instead",
                    method_name
                ),
            ));
        }
    }

    for arg in &method.sig.inputs {
        if let FnArg::Typed(pat_type) = arg {
            if !matches!(pat_type.pat.as_ref(), Pat::Ident(_)) {
                return Err(syn::Error::new(
                    pat_type.pat.span(),
                    format!("method '{}': parameters must be plain identifiers", method_name),
                ));
            }
            if let Err(msg) = check_ffi_safe_type(&pat_type.ty) {
                return Err(syn::Error::new(
                    pat_type.ty.span(),
                    format!("method '{}': {}", method_name, msg),
                ));
            }
        }
    }

    if let syn::ReturnType::Type(_, ty) = &method.sig.output
        && let Err(msg) = check_ffi_safe_type(ty)
    {
        return Err(syn::Error::new(
            ty.span(),
            format!("method '{}': return type - {}", method_name, msg),
        ));
    }

    Ok(())
}

/// Validate the trait itself
fn validate_trait(input: &ItemTrait) -> Result<(), syn::Error> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "generic foreign interfaces are not supported, each version is a concrete layout",
        ));
    }

    for item in &input.items {
        match item {
            TraitItem::Fn(method) => validate_trait_method(method)?,
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "foreign interfaces may only contain methods",
                ));
            }
        }
    }

    Ok(())
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse `#[slot(N)]` from a list of attributes.
fn parse_slot_attr(attr: &Attribute) -> syn::Result<usize> {
    let lit: LitInt = attr.parse_args()?;
    lit.base10_parse::<usize>()
}

/// Parse `#[returns_interface(version = param, table = path)]`.
fn parse_returns_interface(attr: &Attribute) -> syn::Result<ReturnsInterface> {
    let mut version = None;
    let mut table = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("version") {
            version = Some(meta.value()?.parse::<Ident>()?);
            Ok(())
        } else if meta.path.is_ident("table") {
            table = Some(meta.value()?.parse::<syn::Path>()?);
            Ok(())
        } else {
            Err(meta.error("expected `version = param` or `table = path`"))
        }
    })?;
    match (version, table) {
        (Some(version), Some(table)) => Ok(ReturnsInterface { version, table }),
        _ => Err(syn::Error::new(
            attr.span(),
            "#[returns_interface] needs both `version = param` and `table = path`",
        )),
    }
}

/// Parse one typed parameter and its `#[convert_pointee]` marker.
fn parse_param(pat_type: &syn::PatType, name: Ident) -> syn::Result<ParamSpec> {
    let mut pointee = None;
    for attr in &pat_type.attrs {
        if !attr.path().is_ident("convert_pointee") {
            return Err(syn::Error::new(
                attr.span(),
                format!("parameter '{}': unsupported attribute", name),
            ));
        }
        let Type::Ptr(ptr) = pat_type.ty.as_ref() else {
            return Err(syn::Error::new(
                pat_type.ty.span(),
                format!(
                    "parameter '{}': #[convert_pointee] needs a *const T or *mut T parameter",
                    name
                ),
            ));
        };
        pointee = Some(Pointee {
            mutable: ptr.mutability.is_some(),
            elem: (*ptr.elem).clone(),
        });
    }
    Ok(ParamSpec {
        name,
        ty: (*pat_type.ty).clone(),
        pointee,
    })
}

/// Split a trait method into its spec and the attributes to pass through.
fn parse_method(method: &syn::TraitItemFn) -> syn::Result<MethodSpec> {
    let mut sdk_name = None;
    let mut hidden_return = false;
    let mut returns_interface = None;
    let mut only = None;
    let mut slot = None;
    let mut attrs = Vec::new();

    for attr in &method.attrs {
        if attr.path().is_ident("sdk_name") {
            let lit: LitStr = attr.parse_args()?;
            sdk_name = Some(lit.value());
        } else if attr.path().is_ident("hidden_return") {
            hidden_return = true;
        } else if attr.path().is_ident("returns_interface") {
            returns_interface = Some(parse_returns_interface(attr)?);
        } else if attr.path().is_ident("only") {
            let versions =
                attr.parse_args_with(Punctuated::<Ident, Token![,]>::parse_terminated)?;
            only = Some(versions.into_iter().collect());
        } else if attr.path().is_ident("slot") {
            slot = Some(parse_slot_attr(attr)?);
        } else {
            attrs.push(attr.clone());
        }
    }

    let ident = method.sig.ident.clone();
    let receiver_mut = method.sig.inputs.iter().any(|arg| {
        matches!(arg, FnArg::Receiver(receiver) if receiver.mutability.is_some())
    });

    let mut params = Vec::new();
    for arg in &method.sig.inputs {
        if let FnArg::Typed(pat_type) = arg
            && let Pat::Ident(pat_ident) = pat_type.pat.as_ref()
        {
            params.push(parse_param(pat_type, pat_ident.ident.clone())?);
        }
    }

    let output = match &method.sig.output {
        syn::ReturnType::Default => None,
        syn::ReturnType::Type(_, ty) => match ty.as_ref() {
            Type::Tuple(tuple) if tuple.elems.is_empty() => None,
            ty => Some(ty.clone()),
        },
    };

    if hidden_return && output.is_none() {
        return Err(syn::Error::new(
            ident.span(),
            format!(
                "method '{}': #[hidden_return] needs a record return type",
                ident
            ),
        ));
    }

    if let Some(wrap) = &returns_interface {
        if hidden_return {
            return Err(syn::Error::new(
                ident.span(),
                format!(
                    "method '{}': #[returns_interface] and #[hidden_return] exclude each other",
                    ident
                ),
            ));
        }
        if !matches!(output, Some(Type::Ptr(_))) {
            return Err(syn::Error::new(
                ident.span(),
                format!(
                    "method '{}': #[returns_interface] needs a pointer return type",
                    ident
                ),
            ));
        }
        let version = params.iter().find(|param| param.name == wrap.version);
        if !matches!(version, Some(ParamSpec { ty: Type::Ptr(_), pointee: None, .. })) {
            return Err(syn::Error::new(
                wrap.version.span(),
                format!(
                    "method '{}': version = {} must name a plain pointer parameter",
                    ident, wrap.version
                ),
            ));
        }
    }

    Ok(MethodSpec {
        sdk_name: sdk_name.unwrap_or_else(|| ident.to_string()),
        ident,
        receiver_mut,
        params,
        output,
        hidden_return,
        returns_interface,
        only,
        slot,
        attrs,
    })
}

/// Convert a trait name to its module name (snake_case)
/// RemotePlay -> remote_play
/// IGameServer -> i_game_server
/// HTTPClient -> http_client
fn to_snake_case(ident: &Ident) -> Ident {
    let name = ident.to_string();
    let chars: Vec<char> = name.chars().collect();
    let mut result = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            // Underscore before an uppercase letter that starts a new word:
            // previous char lowercase, or next char lowercase (the "C" in "HTTPClient")
            if i > 0 {
                let prev_lower = chars[i - 1].is_lowercase();
                let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
                if prev_lower || next_lower {
                    result.push('_');
                }
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    format_ident!("{}", result)
}

/// Assign slots for one version. Methods not in the version are skipped,
/// gaps left by explicit slots become reserved entries.
fn layout_version<'a>(
    methods: &'a [MethodSpec],
    version: &Ident,
) -> syn::Result<Vec<SlotEntry<'a>>> {
    let mut entries = Vec::new();
    let mut next_slot = 0usize;

    for method in methods {
        if let Some(only) = &method.only
            && !only.iter().any(|v| v == version)
        {
            continue;
        }

        let slot = match method.slot {
            Some(explicit) if explicit < next_slot => {
                return Err(syn::Error::new(
                    method.ident.span(),
                    format!(
                        "slot({}) for method '{}' would overlap with previous slots in {} (next available: {})",
                        explicit, method.ident, version, next_slot
                    ),
                ));
            }
            Some(explicit) => explicit,
            None => next_slot,
        };

        while next_slot < slot {
            entries.push(SlotEntry::Reserved(next_slot));
            next_slot += 1;
        }
        entries.push(SlotEntry::Method(slot, method));
        next_slot = slot + 1;
    }

    Ok(entries)
}

// =============================================================================
// Code generation
// =============================================================================

/// Emit the native capability trait: the user's trait with every type
/// replaced by its native representation.
fn generate_native_trait(input: &ItemTrait, methods: &[MethodSpec]) -> TokenStream2 {
    let vis = &input.vis;
    let trait_name = &input.ident;
    let trait_attrs = &input.attrs;
    let supertraits = &input.supertraits;
    let colon = input.colon_token;

    let trait_methods = methods.iter().map(|method| {
        let attrs = &method.attrs;
        let ident = &method.ident;
        let receiver = if method.receiver_mut {
            quote! { &mut self }
        } else {
            quote! { &self }
        };
        let params = method.params.iter().map(|param| {
            let name = &param.name;
            let ty = native_param_type(param);
            quote! { #name: #ty }
        });
        let output = native_output(method);
        quote! {
            #(#attrs)*
            fn #ident(#receiver #(, #params)*) #output;
        }
    });

    quote! {
        #(#trait_attrs)*
        #vis trait #trait_name #colon #supertraits {
            #(#trait_methods)*
        }
    }
}

/// Native type of one parameter. Converted pointees keep the pointer and
/// change what it points to.
fn native_param_type(param: &ParamSpec) -> TokenStream2 {
    match &param.pointee {
        Some(Pointee {
            mutable: true,
            elem,
        }) => quote! { *mut <#elem as ::abibridge::Marshal>::Native },
        Some(Pointee {
            mutable: false,
            elem,
        }) => quote! { *const <#elem as ::abibridge::Marshal>::Native },
        None => {
            let ty = &param.ty;
            quote! { <#ty as ::abibridge::Marshal>::Native }
        }
    }
}

/// Compile-time rejection of records returned by value
fn generate_return_checks(methods: &[MethodSpec]) -> TokenStream2 {
    let checks = methods.iter().filter_map(|method| {
        let ty = method.output.as_ref()?;
        if method.hidden_return {
            return None;
        }
        let message = format!(
            "method '{}' returns a record by value, mark it #[hidden_return]",
            method.ident
        );
        Some(quote! {
            const _: () = assert!(!<#ty as ::abibridge::Marshal>::KIND.is_record(), #message);
        })
    });
    quote! { #(#checks)* }
}

/// `-> <T as Marshal>::Native`, or nothing for void methods
fn native_output(method: &MethodSpec) -> TokenStream2 {
    match &method.output {
        Some(ty) => quote! { -> <#ty as ::abibridge::Marshal>::Native },
        None => quote! {},
    }
}

/// Foreign signature pieces: extra hidden-return parameter and return type
fn foreign_output(method: &MethodSpec) -> (TokenStream2, TokenStream2) {
    match (&method.output, method.hidden_return) {
        (Some(ty), true) => (quote! { , __ret: *mut #ty }, quote! { -> *mut #ty }),
        (Some(ty), false) => (quote! {}, quote! { -> #ty }),
        (None, _) => (quote! {}, quote! {}),
    }
}

fn generate_descriptor(
    name: &LitStr,
    entries: &[SlotEntry<'_>],
) -> TokenStream2 {
    let slot_count = entries.len();
    let methods = entries.iter().filter_map(|entry| {
        let SlotEntry::Method(slot, method) = entry else {
            return None;
        };
        let sdk_name = &method.sdk_name;
        let hidden = method.hidden_return;
        let ret = match &method.output {
            Some(ty) => quote! { <#ty as ::abibridge::Marshal>::KIND },
            None => quote! { ::abibridge::ValueKind::Void },
        };
        let params = method.params.iter().map(|param| {
            let pname_str = param.name.to_string();
            let pty = &param.ty;
            quote! {
                ::abibridge::ParamDescriptor {
                    name: #pname_str,
                    kind: <#pty as ::abibridge::Marshal>::KIND,
                }
            }
        });
        Some(quote! {
            ::abibridge::MethodDescriptor {
                name: #sdk_name,
                slot: #slot,
                ret: #ret,
                params: &[#(#params),*],
                hidden_return: #hidden,
            }
        })
    });

    quote! {
        /// Descriptor of this interface version
        pub static DESCRIPTOR: ::abibridge::InterfaceDescriptor = ::abibridge::InterfaceDescriptor {
            interface: #name,
            version: VERSION,
            slot_count: #slot_count,
            methods: &[#(#methods),*],
        };
    }
}

/// Foreign vtable struct, thunks and prototype for one version
fn generate_foreign_side(entries: &[SlotEntry<'_>]) -> TokenStream2 {
    let mut fields = Vec::new();
    let mut thunks = Vec::new();
    let mut prototype = Vec::new();

    for entry in entries {
        match entry {
            SlotEntry::Reserved(slot) => {
                let field = format_ident!("__reserved_slot_{}", slot);
                let thunk = format_ident!("__thunk_reserved_{}", slot);
                fields.push(quote! {
                    #[cfg(target_arch = "x86")]
                    pub #field: unsafe extern "thiscall" fn(this: *mut Handle),
                    #[cfg(not(target_arch = "x86"))]
                    pub #field: unsafe extern "C" fn(this: *mut Handle)
                });
                let body = quote! {
                    ::abibridge::thunk::reserved_slot_called(&DESCRIPTOR, #slot)
                };
                thunks.push(quote! {
                    #[cfg(target_arch = "x86")]
                    unsafe extern "thiscall" fn #thunk(__this: *mut Handle) { #body }
                    #[cfg(not(target_arch = "x86"))]
                    unsafe extern "C" fn #thunk(__this: *mut Handle) { #body }
                });
                prototype.push(quote! { #field: #thunk });
            }
            SlotEntry::Method(slot, method) => {
                let ident = &method.ident;
                let thunk = format_ident!("__thunk_{}", ident);
                let param_names: Vec<_> = method.params.iter().map(|p| &p.name).collect();
                let param_types: Vec<_> = method.params.iter().map(|p| &p.ty).collect();
                let (hidden_param, ret) = foreign_output(method);

                fields.push(quote! {
                    #[cfg(target_arch = "x86")]
                    pub #ident: unsafe extern "thiscall" fn(
                        this: *mut Handle
                        #hidden_param
                        #(, #param_names: #param_types)*
                    ) #ret,
                    #[cfg(not(target_arch = "x86"))]
                    pub #ident: unsafe extern "C" fn(
                        this: *mut Handle
                        #hidden_param
                        #(, #param_names: #param_types)*
                    ) #ret
                });

                let mut copies = Vec::new();
                let mut write_backs = Vec::new();
                let args = method.params.iter().map(|param| {
                    let name = &param.name;
                    let ty = &param.ty;
                    let Some(pointee) = &param.pointee else {
                        return quote! { <#ty as ::abibridge::Marshal>::to_native(#name) };
                    };
                    let elem = &pointee.elem;
                    let copy = format_ident!("__pointee_{}", name);
                    copies.push(quote! {
                        let mut #copy =
                            ::abibridge::thunk::pointee_to_native::<#elem>(#name as *const #elem);
                    });
                    if pointee.mutable {
                        write_backs.push(quote! {
                            ::abibridge::thunk::pointee_from_native::<#elem>(#name, #copy);
                        });
                        quote! { ::abibridge::thunk::native_pointee(&mut #copy) }
                    } else {
                        quote! { ::abibridge::thunk::native_pointee(&mut #copy) as *const _ }
                    }
                });
                let args: Vec<_> = args.collect();
                let call = quote! {
                    (__table.#ident)(
                        __native
                        #(, #args)*
                    )
                };
                let finish = match (&method.output, method.hidden_return, &method.returns_interface) {
                    (Some(ty), true, _) => quote! {
                        let __result = #call;
                        #(#write_backs)*
                        ::abibridge::thunk::write_hidden_return(
                            __ret,
                            <#ty as ::abibridge::Marshal>::from_native(__result),
                        )
                    },
                    (Some(ty), false, Some(wrap)) => {
                        let version = &wrap.version;
                        let table = &wrap.table;
                        quote! {
                            let __result = #call;
                            #(#write_backs)*
                            ::abibridge::thunk::wrap_interface(
                                #table(),
                                #version as *const ::std::ffi::c_char,
                                <#ty as ::abibridge::Marshal>::from_native(__result)
                                    as *mut ::std::ffi::c_void,
                            ) as #ty
                        }
                    }
                    (Some(ty), false, None) => quote! {
                        let __result = #call;
                        #(#write_backs)*
                        <#ty as ::abibridge::Marshal>::from_native(__result)
                    },
                    (None, _, _) => quote! {
                        #call;
                        #(#write_backs)*
                    },
                };
                let body = quote! {
                    unsafe {
                        ::abibridge::thunk::trace_call(
                            &DESCRIPTOR,
                            #slot,
                            __this as *const ::std::ffi::c_void,
                        );
                        let __native = ::abibridge::thunk::native_of(__this);
                        let __table: &NativeVTable = ::abibridge::thunk::native_vtable(__native);
                        #(#copies)*
                        #finish
                    }
                };

                thunks.push(quote! {
                    #[cfg(target_arch = "x86")]
                    unsafe extern "thiscall" fn #thunk(
                        __this: *mut Handle
                        #hidden_param
                        #(, #param_names: #param_types)*
                    ) #ret {
                        #body
                    }

                    #[cfg(not(target_arch = "x86"))]
                    unsafe extern "C" fn #thunk(
                        __this: *mut Handle
                        #hidden_param
                        #(, #param_names: #param_types)*
                    ) #ret {
                        #body
                    }
                });
                prototype.push(quote! { #ident: #thunk });
            }
        }
    }

    quote! {
        /// Foreign vtable, one slot per descriptor entry
        #[repr(C)]
        pub struct ForeignVTable {
            #(#fields),*
        }

        /// The object foreign callers receive
        pub type Handle = ::abibridge::ForeignHandle<ForeignVTable>;

        #(#thunks)*

        const PROTOTYPE: ForeignVTable = ForeignVTable {
            #(#prototype),*
        };
    }
}

/// Native vtable, static table for Rust implementations and `NativeObject`
fn generate_native_side(trait_name: &Ident, entries: &[SlotEntry<'_>]) -> TokenStream2 {
    let mut fields = Vec::new();
    let mut glue = Vec::new();
    let mut table = Vec::new();

    for entry in entries {
        match entry {
            SlotEntry::Reserved(slot) => {
                let field = format_ident!("__reserved_slot_{}", slot);
                let func = format_ident!("__native_reserved_{}", slot);
                fields.push(quote! {
                    pub #field: unsafe extern "C" fn(native: *mut ::std::ffi::c_void)
                });
                glue.push(quote! {
                    unsafe extern "C" fn #func(__native: *mut ::std::ffi::c_void) {
                        ::abibridge::thunk::reserved_slot_called(&DESCRIPTOR, #slot)
                    }
                });
                table.push(quote! { #field: #func });
            }
            SlotEntry::Method(_, method) => {
                let ident = &method.ident;
                let func = format_ident!("__native_{}", ident);
                let param_names: Vec<_> = method.params.iter().map(|p| &p.name).collect();
                let native_types: Vec<_> = method.params.iter().map(native_param_type).collect();
                let output = native_output(method);

                fields.push(quote! {
                    pub #ident: unsafe extern "C" fn(
                        native: *mut ::std::ffi::c_void
                        #(, #param_names: #native_types)*
                    ) #output
                });

                let object = if method.receiver_mut {
                    quote! { let __object = unsafe { &mut *(__native as *mut NativeObject) }; }
                } else {
                    quote! { let __object = unsafe { &*(__native as *const NativeObject) }; }
                };
                glue.push(quote! {
                    unsafe extern "C" fn #func(
                        __native: *mut ::std::ffi::c_void
                        #(, #param_names: #native_types)*
                    ) #output {
                        #object
                        __object.inner.#ident(#(#param_names),*)
                    }
                });
                table.push(quote! { #ident: #func });
            }
        }
    }

    quote! {
        /// Native-side vtable (C ABI), same slot order as the foreign one
        #[repr(C)]
        pub struct NativeVTable {
            #(#fields),*
        }

        /// A Rust implementation of the interface laid out as a native-side
        /// object (vtable pointer first), ready to be paired with a handle.
        #[repr(C)]
        pub struct NativeObject {
            // read by thunks through the object pointer
            #[allow(dead_code)]
            vtable: *const NativeVTable,
            inner: Box<dyn #trait_name>,
        }

        impl NativeObject {
            pub fn new<T: #trait_name + 'static>(inner: T) -> Box<Self> {
                Box::new(Self {
                    vtable: &NATIVE_VTABLE,
                    inner: Box::new(inner),
                })
            }

            /// Leak into the opaque pointer `create` expects.
            pub fn into_raw(self: Box<Self>) -> *mut ::std::ffi::c_void {
                Box::into_raw(self) as *mut ::std::ffi::c_void
            }

            /// Take back ownership of a pointer made by `into_raw`.
            ///
            /// # Safety
            /// `native` must come from `into_raw` and no handle may still use it.
            pub unsafe fn from_raw(native: *mut ::std::ffi::c_void) -> Box<Self> {
                unsafe { Box::from_raw(native as *mut Self) }
            }

            pub fn inner(&self) -> &dyn #trait_name {
                &*self.inner
            }
        }

        static NATIVE_VTABLE: NativeVTable = NativeVTable {
            #(#table),*
        };

        #(#glue)*
    }
}

fn generate_version(
    name: &LitStr,
    trait_name: &Ident,
    spec: &VersionSpec,
    entries: &[SlotEntry<'_>],
) -> TokenStream2 {
    let module = &spec.module;
    let version = &spec.version;
    let descriptor = generate_descriptor(name, entries);
    let foreign = generate_foreign_side(entries);
    let native = generate_native_side(trait_name, entries);
    let doc = format!(" `{}`", version.value());

    quote! {
        #[doc = #doc]
        pub mod #module {
            #[allow(unused_imports)]
            use super::*;

            pub const VERSION: &str = #version;

            #descriptor

            #foreign

            #native

            /// The shared foreign vtable of this version, built on first use.
            pub fn vtable() -> &'static ForeignVTable {
                match ::abibridge::registry().register(&DESCRIPTOR, PROTOTYPE) {
                    Ok(table) => table,
                    Err(err) => ::abibridge::fatal(&DESCRIPTOR, &err),
                }
            }

            /// Pair `native` with this version's vtable.
            ///
            /// # Safety
            /// `native` must point to a native-side object with a `NativeVTable`
            /// as its first field, and must outlive the handle.
            pub unsafe fn create(native: *mut ::std::ffi::c_void) -> *mut Handle {
                ::abibridge::ForeignHandle::create(vtable(), native, &DESCRIPTOR).as_ptr()
            }

            /// Free a handle made by `create`. The native object is untouched.
            ///
            /// # Safety
            /// `handle` must come from `create` and must not be used again.
            pub unsafe fn release(handle: *mut Handle) {
                if let Some(handle) = ::std::ptr::NonNull::new(handle) {
                    unsafe { ::abibridge::ForeignHandle::destroy(handle) }
                }
            }

            unsafe fn create_erased(native: *mut ::std::ffi::c_void) -> *mut ::std::ffi::c_void {
                unsafe { create(native) as *mut ::std::ffi::c_void }
            }

            pub const CONSTRUCTOR: ::abibridge::Constructor = ::abibridge::Constructor {
                version: VERSION,
                descriptor: &DESCRIPTOR,
                create: create_erased,
            };
        }
    }
}

fn foreign_interface_internal(
    config: InterfaceConfig,
    input: ItemTrait,
) -> syn::Result<TokenStream2> {
    validate_trait(&input)?;

    let trait_name = &input.ident;
    if config.versions.is_empty() {
        return Err(syn::Error::new(
            trait_name.span(),
            "foreign_interface needs at least one entry in versions(...)",
        ));
    }
    for (i, spec) in config.versions.iter().enumerate() {
        if config.versions[..i].iter().any(|prev| prev.module == spec.module) {
            return Err(syn::Error::new(
                spec.module.span(),
                format!("version module '{}' listed twice", spec.module),
            ));
        }
    }

    let name = config
        .name
        .clone()
        .unwrap_or_else(|| LitStr::new(&trait_name.to_string(), trait_name.span()));

    let methods = input
        .items
        .iter()
        .filter_map(|item| match item {
            TraitItem::Fn(method) => Some(parse_method(method)),
            _ => None,
        })
        .collect::<syn::Result<Vec<_>>>()?;

    for method in &methods {
        if let Some(only) = &method.only {
            for version in only {
                if !config.versions.iter().any(|spec| &spec.module == version) {
                    return Err(syn::Error::new(
                        version.span(),
                        format!("#[only({})]: no such version in versions(...)", version),
                    ));
                }
            }
        }
    }

    let native_trait = generate_native_trait(&input, &methods);
    let return_checks = generate_return_checks(&methods);
    let vis = &input.vis;
    let module = to_snake_case(trait_name);

    let mut versions = Vec::new();
    for spec in &config.versions {
        let entries = layout_version(&methods, &spec.module)?;
        versions.push(generate_version(&name, trait_name, spec, &entries));
    }
    let constructors = config.versions.iter().map(|spec| {
        let module = &spec.module;
        quote! { #module::CONSTRUCTOR }
    });

    Ok(quote! {
        #native_trait

        /// Foreign-ABI adapters, one module per interface version
        #vis mod #module {
            #[allow(unused_imports)]
            use super::*;

            pub const INTERFACE: &str = #name;

            #return_checks

            #(#versions)*

            /// Constructors of every version, in declaration order
            pub const CONSTRUCTORS: &[::abibridge::Constructor] = &[#(#constructors),*];
        }
    })
}

/// Generate foreign-ABI adapters for every version of an interface.
///
/// # Example
/// ```ignore
/// #[foreign_interface(
///     name = "ISteamRemotePlay",
///     versions(v001 = "STEAMREMOTEPLAY_INTERFACE_VERSION001"),
/// )]
/// pub trait RemotePlay {
///     #[sdk_name("GetSessionCount")]
///     fn get_session_count(&self) -> u32;
/// }
/// ```
#[proc_macro_attribute]
pub fn foreign_interface(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut config = InterfaceConfig::default();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("name") {
            config.name = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("versions") {
            meta.parse_nested_meta(|inner| {
                let module = inner
                    .path
                    .get_ident()
                    .cloned()
                    .ok_or_else(|| inner.error("expected a module name, e.g. v001 = \"...\""))?;
                let version: LitStr = inner.value()?.parse()?;
                config.versions.push(VersionSpec { module, version });
                Ok(())
            })
        } else {
            Err(meta.error("unsupported foreign_interface property"))
        }
    });
    parse_macro_input!(attr with parser);

    let input = parse_macro_input!(item as ItemTrait);
    foreign_interface_internal(config, input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn methods(source: &str) -> Vec<MethodSpec> {
        let input: ItemTrait = syn::parse_str(source).unwrap();
        input
            .items
            .iter()
            .map(|item| match item {
                TraitItem::Fn(method) => parse_method(method).unwrap(),
                _ => unreachable!(),
            })
            .collect()
    }

    fn describe(entries: &[SlotEntry<'_>]) -> Vec<String> {
        entries
            .iter()
            .map(|entry| match entry {
                SlotEntry::Method(slot, method) => format!("{}:{}", slot, method.sdk_name),
                SlotEntry::Reserved(slot) => format!("{}:-", slot),
            })
            .collect()
    }

    #[test]
    fn test_snake_case_module_names() {
        assert_eq!(to_snake_case(&format_ident!("RemotePlay")), "remote_play");
        assert_eq!(to_snake_case(&format_ident!("IGameServer")), "i_game_server");
        assert_eq!(to_snake_case(&format_ident!("HTTPClient")), "http_client");
    }

    #[test]
    fn test_only_filters_per_version() {
        let methods = methods(
            "trait T {
                fn a(&self) -> u32;
                #[only(v2)]
                fn b(&self, x: bool) -> bool;
                fn c(&self);
            }",
        );
        let v1 = layout_version(&methods, &format_ident!("v1")).unwrap();
        let v2 = layout_version(&methods, &format_ident!("v2")).unwrap();
        assert_eq!(describe(&v1), vec!["0:a", "1:c"]);
        assert_eq!(describe(&v2), vec!["0:a", "1:b", "2:c"]);
    }

    #[test]
    fn test_explicit_slot_leaves_reserved_gap() {
        let methods = methods(
            "trait T {
                fn a(&self);
                #[slot(3)]
                #[sdk_name(\"Bee\")]
                fn b(&self);
            }",
        );
        let entries = layout_version(&methods, &format_ident!("v1")).unwrap();
        assert_eq!(describe(&entries), vec!["0:a", "1:-", "2:-", "3:Bee"]);
    }

    #[test]
    fn test_overlapping_slot_rejected() {
        let methods = methods(
            "trait T {
                fn a(&self);
                fn b(&self);
                #[slot(1)]
                fn c(&self);
            }",
        );
        assert!(layout_version(&methods, &format_ident!("v1")).is_err());
    }

    #[test]
    fn test_hidden_return_needs_output() {
        let input: ItemTrait = syn::parse_str(
            "trait T {
                #[hidden_return]
                fn a(&self);
            }",
        )
        .unwrap();
        let TraitItem::Fn(method) = &input.items[0] else {
            unreachable!()
        };
        assert!(parse_method(method).is_err());
    }

    #[test]
    fn test_ffi_unsafe_types_rejected() {
        let input: ItemTrait = syn::parse_str("trait T { fn a(&self, s: String); }").unwrap();
        assert!(validate_trait(&input).is_err());

        let input: ItemTrait = syn::parse_str("trait T { fn a(&self, s: &u32); }").unwrap();
        assert!(validate_trait(&input).is_err());

        let input: ItemTrait = syn::parse_str("trait T { fn a(self); }").unwrap();
        assert!(validate_trait(&input).is_err());

        let input: ItemTrait =
            syn::parse_str("trait T { fn a(&self, x: *mut i32, y: u64) -> bool; }").unwrap();
        assert!(validate_trait(&input).is_ok());
    }

    fn parse_one(source: &str) -> syn::Result<MethodSpec> {
        let input: ItemTrait = syn::parse_str(source).unwrap();
        let TraitItem::Fn(method) = &input.items[0] else {
            unreachable!()
        };
        parse_method(method)
    }

    #[test]
    fn test_nullable_pointer_options_allowed() {
        for allowed in [
            "trait T { fn a(&self, p: Option<NonNull<u8>>); }",
            "trait T { fn a(&self, p: Option<std::ptr::NonNull<Stamp>>) -> bool; }",
            "trait T { fn a(&self, cb: Option<extern \"C\" fn(u32)>); }",
            "trait T { fn a(&self) -> Option<unsafe extern \"C\" fn(*mut c_void) -> bool>; }",
        ] {
            let input: ItemTrait = syn::parse_str(allowed).unwrap();
            assert!(validate_trait(&input).is_ok(), "{}", allowed);
        }

        for rejected in [
            "trait T { fn a(&self, p: Option<u32>); }",
            "trait T { fn a(&self, cb: Option<fn(u32)>); }",
            "trait T { fn a(&self, p: Option<Box<u8>>); }",
        ] {
            let input: ItemTrait = syn::parse_str(rejected).unwrap();
            assert!(validate_trait(&input).is_err(), "{}", rejected);
        }
    }

    #[test]
    fn test_convert_pointee_parameters() {
        let method =
            parse_one("trait T { fn a(&self, #[convert_pointee] s: *mut Stamp, n: u32); }").unwrap();
        let pointee = method.params[0].pointee.as_ref().unwrap();
        assert!(pointee.mutable);
        assert!(method.params[1].pointee.is_none());

        let method =
            parse_one("trait T { fn a(&self, #[convert_pointee] s: *const Stamp); }").unwrap();
        assert!(!method.params[0].pointee.as_ref().unwrap().mutable);

        assert!(parse_one("trait T { fn a(&self, #[convert_pointee] s: Stamp); }").is_err());
        assert!(parse_one("trait T { fn a(&self, #[inline] s: *mut Stamp); }").is_err());
    }

    #[test]
    fn test_returns_interface_arguments() {
        let method = parse_one(
            "trait T {
                #[returns_interface(version = pch_version, table = crate::interfaces)]
                fn get(&self, pch_version: *const c_char) -> *mut c_void;
            }",
        )
        .unwrap();
        let wrap = method.returns_interface.unwrap();
        assert_eq!(wrap.version, "pch_version");
        assert_eq!(wrap.table.segments.len(), 2);

        // unknown version parameter
        assert!(parse_one(
            "trait T {
                #[returns_interface(version = name, table = interfaces)]
                fn get(&self, pch_version: *const c_char) -> *mut c_void;
            }",
        )
        .is_err());
        // not a pointer result
        assert!(parse_one(
            "trait T {
                #[returns_interface(version = v, table = interfaces)]
                fn get(&self, v: *const c_char) -> u32;
            }",
        )
        .is_err());
        // table missing
        assert!(parse_one(
            "trait T {
                #[returns_interface(version = v)]
                fn get(&self, v: *const c_char) -> *mut c_void;
            }",
        )
        .is_err());
    }

    #[test]
    fn test_by_value_returns_are_checked() {
        let methods = methods(
            "trait T {
                fn count(&self) -> u32;
                #[hidden_return]
                fn owner(&self) -> SteamId;
                fn reset(&self);
            }",
        );
        let checks = generate_return_checks(&methods).to_string();
        assert!(checks.contains("'count'"));
        assert!(!checks.contains("'owner'"));
        assert!(!checks.contains("'reset'"));
    }

    #[test]
    fn test_attributes_are_stripped_except_docs() {
        let methods = methods(
            "trait T {
                /// Count things
                #[sdk_name(\"GetCount\")]
                #[only(v1)]
                fn count(&self) -> u32;
            }",
        );
        assert_eq!(methods[0].sdk_name, "GetCount");
        assert_eq!(methods[0].attrs.len(), 1);
        assert!(methods[0].attrs[0].path().is_ident("doc"));
    }
}
