//! Resolution of contract imports against the host registry.

use std::sync::Arc;

use wasmtime::{ExternType, MemoryType};

use crate::module_env::{ModuleEnv, Signature};
use crate::{ConstructionError, ENV_MODULE};

/// Field name under which a contract may import its linear memory
pub const MEMORY_IMPORT: &str = "memory";

/// One export of the synthesized `env` module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedExport {
    pub name: &'static str,
    pub index: usize,
    pub signature: Signature,
}

/// Virtual module answering a loader's request for an import namespace
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    pub name: String,
    pub exports: Vec<ResolvedExport>,
}

impl ResolvedModule {
    pub fn export(&self, name: &str) -> Option<&ResolvedExport> {
        self.exports.iter().find(|e| e.name == name)
    }
}

/// How a single import of a contract is satisfied
#[derive(Debug, Clone, PartialEq)]
pub enum ImportBinding {
    /// Host function at this registry index
    Function(usize),
    /// Linear memory provided by the VM
    Memory(MemoryType),
}

#[derive(Debug, Clone)]
pub struct ImportResolver {
    env: Arc<ModuleEnv>,
}

impl ImportResolver {
    pub fn new(env: Arc<ModuleEnv>) -> Self {
        Self { env }
    }

    pub fn module_env(&self) -> &Arc<ModuleEnv> {
        &self.env
    }

    /// Synthesizes the module for `name`; only `env` exists
    pub fn resolve(&self, name: &str) -> Result<ResolvedModule, ConstructionError> {
        if name != ENV_MODULE {
            return Err(ConstructionError::UnsupportedImportModule(name.to_string()));
        }

        let exports = self
            .env
            .functions()
            .iter()
            .enumerate()
            .map(|(index, function)| ResolvedExport {
                name: function.name,
                index,
                signature: function.signature.clone(),
            })
            .collect();

        Ok(ResolvedModule {
            name: name.to_string(),
            exports,
        })
    }

    /// Checks one declared import of a contract
    pub fn bind(
        &self,
        module: &str,
        name: &str,
        ty: &ExternType,
    ) -> Result<ImportBinding, ConstructionError> {
        if module != ENV_MODULE {
            return Err(ConstructionError::UnsupportedImportModule(module.to_string()));
        }

        let unresolved = || ConstructionError::UnresolvedImport {
            module: module.to_string(),
            name: name.to_string(),
        };

        match ty {
            ExternType::Func(func) => {
                let index = self.env.index_of(name).ok_or_else(unresolved)?;
                let expected = &self.env.functions()[index].signature;
                let found = Signature::from(func);
                if *expected != found {
                    return Err(ConstructionError::ImportSignatureMismatch {
                        name: name.to_string(),
                        expected: expected.to_string(),
                        found: found.to_string(),
                    });
                }
                Ok(ImportBinding::Function(index))
            }
            ExternType::Memory(memory) if name == MEMORY_IMPORT && !memory.is_64() => {
                Ok(ImportBinding::Memory(memory.clone()))
            }
            _ => Err(unresolved()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_env::HostCall;
    use wasmtime::{FuncType, ValType};

    fn resolver() -> ImportResolver {
        ImportResolver::new(Arc::new(ModuleEnv::new()))
    }

    #[test]
    fn test_only_env_resolves() {
        let err = resolver().resolve("math").unwrap_err();
        assert!(matches!(err, ConstructionError::UnsupportedImportModule(ref m) if m == "math"));

        let env = resolver().resolve("env").unwrap();
        assert_eq!(env.exports.len(), HostCall::ALL.len());
        for (index, call) in HostCall::ALL.iter().enumerate() {
            let export = env.export(call.name()).unwrap();
            assert_eq!(export.index, index);
            assert_eq!(export.signature, call.signature());
        }
    }

    #[test]
    fn test_bind_function_import() {
        let ty = ExternType::Func(FuncType::new([ValType::I32], [ValType::I32]));
        let binding = resolver().bind("env", "strlen", &ty).unwrap();
        assert_eq!(binding, ImportBinding::Function(2));
    }

    #[test]
    fn test_bind_rejects_unknown_name_and_module() {
        let ty = ExternType::Func(FuncType::new([], []));
        assert!(matches!(
            resolver().bind("env", "abort", &ty),
            Err(ConstructionError::UnresolvedImport { .. })
        ));
        assert!(matches!(
            resolver().bind("wasi_snapshot_preview1", "fd_write", &ty),
            Err(ConstructionError::UnsupportedImportModule(_))
        ));
    }

    #[test]
    fn test_bind_rejects_signature_mismatch() {
        let ty = ExternType::Func(FuncType::new([ValType::I64], [ValType::I32]));
        assert!(matches!(
            resolver().bind("env", "strlen", &ty),
            Err(ConstructionError::ImportSignatureMismatch { .. })
        ));
    }

    #[test]
    fn test_bind_memory_import() {
        let ty = ExternType::Memory(MemoryType::new(1, None));
        assert!(matches!(
            resolver().bind("env", "memory", &ty),
            Ok(ImportBinding::Memory(_))
        ));
        assert!(resolver().bind("env", "heap", &ty).is_err());
    }
}
