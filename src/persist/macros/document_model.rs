#[macro_export]
macro_rules! document_model {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident in $model:literal with timestamps {
            $($field:ident : $field_ty:ty),+ $(,)?
        }
    ) => {
        $crate::document_model!(
            @model [$(#[$meta])*] $vis $name, $model, true, $($field: $field_ty),+
        );
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident in $model:literal {
            $($field:ident : $field_ty:ty),+ $(,)?
        }
    ) => {
        $crate::document_model!(
            @model [$(#[$meta])*] $vis $name, $model, false, $($field: $field_ty),+
        );
    };
    (
        @model [$(#[$meta:meta])*] $vis:vis $name:ident, $model:literal, $timestamps:literal,
        $($field:ident : $field_ty:ty),+
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $name {
            document: $crate::persist::Document,
        }

        impl $name {
            pub const MODEL_NAME: &'static str = $model;

            /// Schema shared by every instance of this model.
            pub fn schema() -> ::std::sync::Arc<$crate::persist::ModelSchema> {
                static SCHEMA: ::std::sync::OnceLock<
                    ::std::sync::Arc<$crate::persist::ModelSchema>,
                > = ::std::sync::OnceLock::new();

                SCHEMA
                    .get_or_init(|| {
                        let mut schema = $crate::persist::ModelSchema::new($model);
                        $(
                            let def = $crate::persist::AttributeDef::new(
                                stringify!($field),
                                <$field_ty as $crate::persist::AttributeValue>::attribute_type(),
                            );
                            let def = if <$field_ty as $crate::persist::AttributeValue>::nullable() {
                                def
                            } else {
                                def.not_null()
                            };
                            schema = schema.with_attribute(def);
                        )+
                        if $timestamps {
                            schema = schema.with_timestamps();
                        }
                        ::std::sync::Arc::new(schema)
                    })
                    .clone()
            }

            /// Creates an unpersisted, clean instance.
            pub fn new($($field: $field_ty),+) -> $crate::core::Result<Self> {
                let document = $crate::persist::Document::new(
                    Self::schema(),
                    [$((
                        stringify!($field),
                        $crate::persist::AttributeValue::into_value($field),
                    )),+],
                )?;
                Ok(Self { document })
            }

            /// Rebuilds a persisted instance from a stored source map.
            pub fn from_stored(
                id: impl Into<String>,
                version: i64,
                source: &::std::collections::BTreeMap<String, $crate::core::Value>,
            ) -> $crate::core::Result<Self> {
                let document =
                    $crate::persist::Document::from_stored(Self::schema(), id, version, source)?;
                Ok(Self { document })
            }

            pub fn from_document(document: $crate::persist::Document) -> $crate::core::Result<Self> {
                if document.model_name() != $model {
                    return Err($crate::core::PersistError::TypeMismatch(format!(
                        "expected a '{}' document, got '{}'",
                        $model,
                        document.model_name()
                    )));
                }
                Ok(Self { document })
            }

            pub fn document(&self) -> &$crate::persist::Document {
                &self.document
            }

            pub fn document_mut(&mut self) -> &mut $crate::persist::Document {
                &mut self.document
            }

            pub fn into_document(self) -> $crate::persist::Document {
                self.document
            }
        }

        $crate::paste::paste! {
            impl $name {
                $(
                    /// Generated typed setter. Returns `true` when the value changed.
                    pub fn [<set_ $field>](&mut self, value: $field_ty) -> $crate::core::Result<bool> {
                        self.document.set(
                            stringify!($field),
                            $crate::persist::AttributeValue::into_value(value),
                        )
                    }

                    /// Generated typed getter.
                    pub fn $field(&self) -> $crate::core::Result<$field_ty> {
                        <$field_ty as $crate::persist::AttributeValue>::read(
                            stringify!($field),
                            self.document.get(stringify!($field)),
                        )
                    }

                    pub fn [<$field _changed>](&self) -> bool {
                        self.document.attribute_changed(stringify!($field))
                    }

                    pub fn [<$field _was>](&self) -> $crate::core::Result<$field_ty> {
                        <$field_ty as $crate::persist::AttributeValue>::read(
                            stringify!($field),
                            self.document.attribute_was(stringify!($field)),
                        )
                    }
                )+
            }
        }

        impl ::std::ops::Deref for $name {
            type Target = $crate::persist::Document;

            fn deref(&self) -> &Self::Target {
                &self.document
            }
        }

        impl ::std::ops::DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.document
            }
        }
    };
}
