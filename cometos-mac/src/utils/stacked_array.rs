/// Array of N1 + N2 + N3 elements with uniform access
///
/// This is a workaround for [T; {N1 + N2 + N3}] in stable rust
#[repr(C)]
pub struct TriplexArray<T, const N1: usize, const N2: usize, const N3: usize>(
    [T; N1],
    [T; N2],
    [T; N3],
);

impl<T, const N1: usize, const N2: usize, const N3: usize> TriplexArray<T, N1, N2, N3> {
    #[allow(clippy::redundant_closure)]
    pub fn from_fn(mut cb: impl FnMut(usize) -> T) -> Self {
        Self(
            core::array::from_fn(|i| cb(i)),
            core::array::from_fn(|i| cb(N1 + i)),
            core::array::from_fn(|i| cb(N1 + N2 + i)),
        )
    }
}

impl<T, const N1: usize, const N2: usize, const N3: usize> core::ops::Deref
    for TriplexArray<T, N1, N2, N3>
{
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        // SAFETY: TriplexArray is #[repr(C)] so the three arrays are laid out contiguously
        unsafe { core::slice::from_raw_parts(core::ptr::from_ref(self).cast::<T>(), N1 + N2 + N3) }
    }
}

impl<T, const N1: usize, const N2: usize, const N3: usize> core::ops::DerefMut
    for TriplexArray<T, N1, N2, N3>
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: TriplexArray is #[repr(C)] so the three arrays are laid out contiguously
        unsafe { core::slice::from_raw_parts_mut(core::ptr::from_mut(self).cast::<T>(), N1 + N2 + N3) }
    }
}
